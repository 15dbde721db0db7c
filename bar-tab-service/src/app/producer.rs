use std::{thread::sleep, time::Duration};

use bar_tab_service::config::Config;
use bar_tab_service::models::Outbox;
use bar_tab_service::{establish_connection, schema};
use diesel::result::Error as DieselError;
use diesel::{
    Connection, ExpressionMethods, PgConnection, QueryDsl, RunQueryDsl, SelectableHelper,
};
use kafka::client::RequiredAcks;
use kafka::producer::{Producer, Record};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Outbox query failed")]
    Database(#[from] DieselError),
    #[error("Cannot send to Kafka")]
    Kafka(#[from] kafka::Error),
}

/// Moves committed change events from the outbox to Kafka, oldest first.
/// A row is deleted only after Kafka acknowledged it.
struct OutboxRelay {
    kafka: Producer,
}

impl OutboxRelay {
    fn relay_next(&mut self, conn: &mut PgConnection) -> Result<bool, RelayError> {
        use schema::outbox::dsl::*;

        conn.transaction::<_, RelayError, _>(|conn| {
            let row = match outbox
                .select(Outbox::as_select())
                .order(id.asc())
                .for_update()
                .skip_locked()
                .first::<Outbox>(conn)
            {
                Ok(row) => row,
                Err(DieselError::NotFound) => return Ok(false),
                Err(err) => return Err(err.into()),
            };

            self.kafka.send(&Record::from_key_value(
                &row.topic,
                row.key.clone(),
                row.value.clone(),
            ))?;
            debug!(outbox_id = row.id, topic = %row.topic, key = %row.key, "relayed");

            diesel::delete(outbox.filter(id.eq(row.id))).execute(conn)?;

            Ok(true)
        })
    }
}

pub fn main(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let conn = &mut establish_connection(config.database_url()?)?;
    let kafka = Producer::from_hosts(vec![config.kafka_url()?.to_string()])
        .with_ack_timeout(Duration::from_secs(1))
        .with_required_acks(RequiredAcks::One)
        .create()?;

    let mut relay = OutboxRelay { kafka };
    info!("relaying outbox");

    loop {
        match relay.relay_next(conn) {
            Ok(true) => {}
            Ok(false) => sleep(Duration::from_secs(1)),
            Err(err) => {
                error!(%err, "Error relaying outbox row");
                sleep(Duration::from_secs(1));
            }
        }
    }
}
