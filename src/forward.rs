use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::ForwardConfig;
use crate::gpio::PinNumber;
use crate::pin::{ChangeHandler, Pin};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub id: String,
    pub pin: PinNumber,
    pub value: u8,
}

/// Hands pin transitions to the HTTP poster task without waiting on it.
pub struct HttpForwarder {
    id: String,
    tx: mpsc::UnboundedSender<Observation>,
}

impl HttpForwarder {
    pub fn new(id: impl Into<String>, tx: mpsc::UnboundedSender<Observation>) -> Self {
        Self { id: id.into(), tx }
    }

    /// Starts the poster on the current actix system and returns its handle.
    pub fn spawn(config: &ForwardConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = awc::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .finish();

        actix_rt::spawn(post_observations(client, config.url.clone(), rx));

        Self::new(config.id.clone(), tx)
    }

    pub fn submit(&self, pin: PinNumber, value: u8) {
        let observation = Observation {
            id: self.id.clone(),
            pin,
            value,
        };
        if self.tx.send(observation).is_err() {
            warn!("Forwarder stopped, dropping PIN[{pin}] {value}");
        }
    }
}

impl ChangeHandler for HttpForwarder {
    fn changed(&self, pin: &Pin, value: u8) {
        debug!("PIN[{}] {value}", pin.number());
        self.submit(pin.number(), value);
    }
}

async fn post_observations(
    client: awc::Client,
    url: String,
    mut rx: mpsc::UnboundedReceiver<Observation>,
) {
    while let Some(observation) = rx.recv().await {
        let client = client.clone();
        let url = url.clone();

        // each post runs on its own so a slow server does not queue up later edges
        actix_rt::spawn(async move {
            debug!("HTTP [{url}] >> {observation:?}");
            match client.post(url.as_str()).send_json(&observation).await {
                Ok(mut response) => {
                    let status = response.status();
                    match response.body().await {
                        Ok(body) => debug!(
                            "HTTP << {} {}",
                            status.as_u16(),
                            String::from_utf8_lossy(&body)
                        ),
                        Err(e) => warn!("HTTP << {} (body unreadable: {e})", status.as_u16()),
                    }
                }
                Err(e) => warn!("HTTP [{url}] failed for PIN[{}]: {e}", observation.pin),
            }
        });
    }
    debug!("Forwarder channel closed");
}
