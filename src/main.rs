use log::info;
use mqtt_stream_broker::{config::BrokerConfig, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = BrokerConfig::from_env()?;
    info!(
        "Granting QoS up to {}, authentication {}",
        config.max_granted_qos,
        if config.credentials.is_some() { "enabled" } else { "disabled" }
    );

    tokio::select! {
        result = server::serve(config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down MQTT broker");
            Ok(())
        }
    }
}
