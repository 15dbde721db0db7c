use std::{thread::sleep, time::Duration};

use bar_tab_service::catalog::{MenuChange, MenuReplica};
use bar_tab_service::config::Config;
use bar_tab_service::store::PgTabStore;
use bar_tab_service::MENU_EVENT_CHANNEL;
use chrono::Utc;
use kafka::{
    client::{FetchOffset, GroupOffsetStorage},
    consumer::Consumer,
};
use tracing::{info, warn};

/// Applies `menu.event` messages to `replica` until polling fails.
pub fn run<R: MenuReplica>(
    kafka_url: &str,
    group: &str,
    replica: &R,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut consumer = Consumer::from_hosts(vec![kafka_url.to_string()])
        .with_topic(MENU_EVENT_CHANNEL.to_string())
        .with_group(group.to_string())
        .with_fallback_offset(FetchOffset::Earliest)
        .with_offset_storage(Some(GroupOffsetStorage::Kafka))
        .create()?;
    info!(topic = MENU_EVENT_CHANNEL, group, "consuming");

    loop {
        let mss = consumer.poll()?;
        if mss.is_empty() {
            sleep(Duration::from_secs(1));
            continue;
        }

        for ms in mss.iter() {
            for m in ms.messages() {
                match MenuChange::decode(m.value, Utc::now()) {
                    Ok(Some(change)) => replica.apply_menu_change(change)?,
                    Ok(None) => {}
                    Err(err) => warn!(%err, offset = m.offset, "skipping menu event"),
                }
            }
            consumer.consume_messageset(ms)?;
        }
        consumer.commit_consumed()?;
    }
}

pub fn main(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = PgTabStore::new(config.database_url()?);
    run(config.kafka_url()?, &config.kafka_group, &store)
}
