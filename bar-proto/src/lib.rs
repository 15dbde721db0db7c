pub mod common {
    tonic::include_proto!("bar.common");
}

pub mod menu {
    tonic::include_proto!("bar.menu");
}

pub mod tab_service {
    tonic::include_proto!("bar.tab_service");
}
