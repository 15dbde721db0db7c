use std::sync::Arc;
use std::thread;

use bar_proto::common::Money;
use bar_proto::tab_service::{
    tab_service_server::{TabService as TabServiceBase, TabServiceServer},
    ApplyEditPayload, BeginEditPayload, CloseTabPayload, CloseTabResponse, CompleteOrderPayload,
    CreateOrderPayload, CreateOrderResponse, CreateTabPayload, DeleteTabPayload, EndEditPayload,
    GetOrderPayload, GetTabPayload, GetTabTotalPayload, KitchenQueueResponse,
    ListKitchenQueuePayload, ListMenuPayload, ListMenuResponse, ListOpenTabsPayload,
    ListTabsResponse, Order, ReopenTabPayload, Tab, TransitionResponse,
};
use bar_tab_service::aggregate::{OrderEdit, Outcome};
use bar_tab_service::config::Config;
use bar_tab_service::error::ServiceError;
use bar_tab_service::establish_connection;
use bar_tab_service::models::{NewOrderItem, TabDetails};
use bar_tab_service::reconciler::SubmittedItem;
use bar_tab_service::serializer::{
    money, serialize_kitchen_ticket, serialize_menu_item, serialize_order, serialize_tab,
};
use bar_tab_service::service::TabService;
use bar_tab_service::store::{MemoryTabStore, PgTabStore, TabStore};
use chrono::Utc;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::consumer;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

pub struct TabServiceImpl<S> {
    service: Arc<TabService<S>>,
}

fn parse_id(value: &str, field: &str) -> Result<Uuid, Status> {
    value
        .parse::<Uuid>()
        .map_err(|_| Status::invalid_argument(format!("Invalid {field}")))
}

fn status(err: ServiceError) -> Status {
    match &err {
        ServiceError::NotFound { .. } => Status::not_found(err.to_string()),
        ServiceError::Validation(_) => Status::invalid_argument(err.to_string()),
        ServiceError::Database(_) | ServiceError::Connection(_) => {
            error!(%err, "storage failure");
            Status::internal("Internal error")
        }
    }
}

fn transition<T>(outcome: Outcome<T>) -> TransitionResponse {
    match outcome {
        Outcome::Applied(_) => TransitionResponse {
            succeed: true,
            reason: None,
        },
        Outcome::Rejected(conflict) => TransitionResponse {
            succeed: false,
            reason: Some(conflict.to_string()),
        },
    }
}

#[tonic::async_trait]
impl<S: TabStore + 'static> TabServiceBase for TabServiceImpl<S> {
    async fn create_tab(
        &self,
        request: Request<CreateTabPayload>,
    ) -> Result<Response<Tab>, Status> {
        let payload = request.into_inner();
        let tab = self.service.create_tab(&payload.name).map_err(status)?;

        Ok(Response::new(serialize_tab(&TabDetails {
            tab,
            orders: Vec::new(),
        })))
    }

    async fn get_tab(&self, request: Request<GetTabPayload>) -> Result<Response<Tab>, Status> {
        let tab_id = parse_id(&request.into_inner().tab_id, "tab_id")?;
        let details = self.service.get_tab(tab_id).map_err(status)?;

        Ok(Response::new(serialize_tab(&details)))
    }

    async fn list_open_tabs(
        &self,
        _request: Request<ListOpenTabsPayload>,
    ) -> Result<Response<ListTabsResponse>, Status> {
        let tabs = self.service.list_open_tabs().map_err(status)?;

        Ok(Response::new(ListTabsResponse {
            tabs: tabs.iter().map(serialize_tab).collect(),
        }))
    }

    async fn get_tab_total(
        &self,
        request: Request<GetTabTotalPayload>,
    ) -> Result<Response<Money>, Status> {
        let tab_id = parse_id(&request.into_inner().tab_id, "tab_id")?;
        let total = self.service.get_tab_total(tab_id).map_err(status)?;

        Ok(Response::new(money(&total)))
    }

    async fn close_tab(
        &self,
        request: Request<CloseTabPayload>,
    ) -> Result<Response<CloseTabResponse>, Status> {
        let tab_id = parse_id(&request.into_inner().tab_id, "tab_id")?;

        let response = match self.service.close_tab(tab_id).map_err(status)? {
            Outcome::Applied(total) => CloseTabResponse {
                succeed: true,
                total: Some(money(&total)),
                reason: None,
            },
            Outcome::Rejected(conflict) => CloseTabResponse {
                succeed: false,
                total: None,
                reason: Some(conflict.to_string()),
            },
        };
        Ok(Response::new(response))
    }

    async fn reopen_tab(
        &self,
        request: Request<ReopenTabPayload>,
    ) -> Result<Response<TransitionResponse>, Status> {
        let tab_id = parse_id(&request.into_inner().tab_id, "tab_id")?;
        let outcome = self.service.reopen_tab(tab_id).map_err(status)?;

        Ok(Response::new(transition(outcome)))
    }

    async fn delete_tab(
        &self,
        request: Request<DeleteTabPayload>,
    ) -> Result<Response<TransitionResponse>, Status> {
        let tab_id = parse_id(&request.into_inner().tab_id, "tab_id")?;
        let tab = self.service.delete_tab(tab_id).map_err(status)?;

        Ok(Response::new(transition(Outcome::Applied(tab))))
    }

    async fn create_order(
        &self,
        request: Request<CreateOrderPayload>,
    ) -> Result<Response<CreateOrderResponse>, Status> {
        let payload = request.into_inner();
        let tab_id = parse_id(&payload.tab_id, "tab_id")?;
        let items = payload
            .items
            .into_iter()
            .map(|i| {
                Ok(NewOrderItem {
                    menu_item_id: parse_id(&i.menu_item_id, "menu_item_id")?,
                    quantity: i.quantity,
                    notes: i.notes,
                })
            })
            .collect::<Result<Vec<_>, Status>>()?;

        let response = match self
            .service
            .create_order(tab_id, payload.notes, &items)
            .map_err(status)?
        {
            Outcome::Applied(details) => CreateOrderResponse {
                succeed: true,
                order: Some(serialize_order(&details)),
                reason: None,
            },
            Outcome::Rejected(conflict) => CreateOrderResponse {
                succeed: false,
                order: None,
                reason: Some(conflict.to_string()),
            },
        };
        Ok(Response::new(response))
    }

    async fn get_order(
        &self,
        request: Request<GetOrderPayload>,
    ) -> Result<Response<Order>, Status> {
        let order_id = parse_id(&request.into_inner().order_id, "order_id")?;
        let details = self.service.get_order(order_id).map_err(status)?;

        Ok(Response::new(serialize_order(&details)))
    }

    async fn begin_edit(
        &self,
        request: Request<BeginEditPayload>,
    ) -> Result<Response<TransitionResponse>, Status> {
        let payload = request.into_inner();
        let order_id = parse_id(&payload.order_id, "order_id")?;
        let outcome = self
            .service
            .begin_edit(order_id, &payload.editor)
            .map_err(status)?;

        Ok(Response::new(transition(outcome)))
    }

    async fn apply_edit(
        &self,
        request: Request<ApplyEditPayload>,
    ) -> Result<Response<TransitionResponse>, Status> {
        let payload = request.into_inner();
        let order_id = parse_id(&payload.order_id, "order_id")?;
        let items = payload
            .items
            .into_iter()
            .map(|i| {
                Ok(SubmittedItem {
                    id: i.id.as_deref().map(|id| parse_id(id, "id")).transpose()?,
                    menu_item_id: parse_id(&i.menu_item_id, "menu_item_id")?,
                    quantity: i.quantity,
                    notes: i.notes,
                })
            })
            .collect::<Result<Vec<_>, Status>>()?;
        let edit = OrderEdit {
            notes: payload.notes,
            items,
            finish: payload.finish,
        };

        let outcome = self.service.apply_edit(order_id, &edit).map_err(status)?;
        Ok(Response::new(transition(outcome)))
    }

    async fn end_edit(
        &self,
        request: Request<EndEditPayload>,
    ) -> Result<Response<TransitionResponse>, Status> {
        let order_id = parse_id(&request.into_inner().order_id, "order_id")?;
        let outcome = self.service.end_edit(order_id).map_err(status)?;

        Ok(Response::new(transition(outcome)))
    }

    async fn complete_order(
        &self,
        request: Request<CompleteOrderPayload>,
    ) -> Result<Response<TransitionResponse>, Status> {
        let order_id = parse_id(&request.into_inner().order_id, "order_id")?;
        let outcome = self.service.complete_order(order_id).map_err(status)?;

        Ok(Response::new(transition(outcome)))
    }

    async fn list_kitchen_queue(
        &self,
        _request: Request<ListKitchenQueuePayload>,
    ) -> Result<Response<KitchenQueueResponse>, Status> {
        let tickets = self.service.kitchen_queue().map_err(status)?;
        let now = Utc::now();

        Ok(Response::new(KitchenQueueResponse {
            tickets: tickets
                .iter()
                .map(|t| serialize_kitchen_ticket(t, now))
                .collect(),
        }))
    }

    async fn list_menu(
        &self,
        _request: Request<ListMenuPayload>,
    ) -> Result<Response<ListMenuResponse>, Status> {
        let items = self.service.list_menu().map_err(status)?;

        Ok(Response::new(ListMenuResponse {
            items: items.iter().map(serialize_menu_item).collect(),
        }))
    }
}

async fn serve<S: TabStore + 'static>(
    config: &Config,
    service: Arc<TabService<S>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<TabServiceServer<TabServiceImpl<S>>>()
        .await;

    info!(addr = %config.listen_addr, "listening");

    Server::builder()
        .add_service(health_service)
        .add_service(TabServiceServer::new(TabServiceImpl { service }))
        .serve(config.listen_addr)
        .await?;

    Ok(())
}

/// Starts the menu replica consumer for the in-memory store. Returns whether it was started.
fn spawn_menu_consumer(config: &Config, service: &Arc<TabService<MemoryTabStore>>) -> bool {
    let Ok(kafka_url) = config.kafka_url() else {
        warn!("KAFKA_URL is not set, the in-memory menu stays empty");
        return false;
    };

    let kafka_url = kafka_url.to_string();
    let group = config.kafka_group.clone();
    let replica = Arc::clone(service);
    thread::spawn(move || {
        if let Err(err) = consumer::run(&kafka_url, &group, replica.store()) {
            error!(%err, "menu consumer stopped");
        }
    });
    true
}

pub async fn main(config: &Config, in_memory: bool) -> Result<(), Box<dyn std::error::Error>> {
    if in_memory {
        let service = Arc::new(TabService::new(MemoryTabStore::new()));
        spawn_menu_consumer(config, &service);

        return serve(config, service).await;
    }

    let database_url = config.database_url()?;
    let mut conn = establish_connection(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| -> Box<dyn std::error::Error> { err })?;

    serve(config, Arc::new(TabService::new(PgTabStore::new(database_url)))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_mode_without_kafka_has_no_menu_consumer() {
        let config = Config {
            database_url: None,
            kafka_url: None,
            kafka_group: "bar-tab-service".to_string(),
            listen_addr: "127.0.0.1:0".parse().unwrap(),
        };
        let service = Arc::new(TabService::new(MemoryTabStore::new()));

        assert!(!spawn_menu_consumer(&config, &service));
        assert!(service.list_menu().unwrap().is_empty());
    }
}
