fn main() {
    tonic_build::configure()
        .compile_protos(
            &[
                "proto/common.proto",
                "proto/menu.proto",
                "proto/tabs.proto",
            ],
            &["proto"],
        )
        .unwrap_or_else(|e| panic!("Failed to compile protos {:?}", e));
}
