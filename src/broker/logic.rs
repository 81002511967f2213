//! Resilient MQTT client and connection lifecycle manager.
//!
//! Mirrors a state-machine shape — Init (connecting), Work (duplex
//! streaming), Error (backoff) — applied here to a broker connection
//! instead of a bidirectional RPC stream.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::broker::domain::{Backoff, ReconnectState};
use crate::bus::domain::{ErrorEvent, EventBus, RawFrame};
use crate::command::domain::{BuiltCommand, OutboundFrame};
use crate::config::BrokerConfig;
use crate::model::domain::DeviceFamily;

fn parse_host_port(url: &str) -> (String, u16) {
    match url.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(1883)),
        None => (url.to_string(), 1883),
    }
}

fn classify_topic(topic: &str, config: &BrokerConfig) -> Option<DeviceFamily> {
    if topic.starts_with(&format!("{}Upload/", config.family_b_topic_root)) {
        Some(DeviceFamily::B)
    } else if topic.starts_with(&format!("{}Upload/", config.family_j_topic_root)) {
        Some(DeviceFamily::J)
    } else {
        None
    }
}

async fn connect(config: &BrokerConfig) -> (AsyncClient, rumqttc::EventLoop) {
    let (host, port) = parse_host_port(&config.url);
    let mut options = MqttOptions::new(config.client_id.clone(), host, port);
    options.set_keep_alive(std::time::Duration::from_secs(30));

    let (client, eventloop) = AsyncClient::new(options, 256);

    for root in [&config.family_b_topic_root, &config.family_j_topic_root] {
        let filter = format!("{root}Upload/+/#");
        if let Err(e) = client.subscribe(&filter, QoS::AtLeastOnce).await {
            error!(filter = %filter, error = %e, "failed to subscribe to broker topic");
        }
    }

    (client, eventloop)
}

/// Owns the broker connection end to end: subscribes both families'
/// upload topics, republishes inbound publishes as `RawFrame`s on the bus,
/// and drains `outbound_rx` to publish built commands downstream.
#[instrument(name = "broker_task", skip(bus, config, outbound_rx))]
pub async fn broker_task(bus: EventBus, config: BrokerConfig, mut outbound_rx: mpsc::Receiver<BuiltCommand>) {
    info!("broker task started");

    let mut state = ReconnectState::Init;
    let mut client: Option<AsyncClient> = None;
    let mut eventloop: Option<rumqttc::EventLoop> = None;
    let mut backoff = Backoff::default();

    loop {
        match state {
            ReconnectState::Init => {
                let (c, el) = connect(&config).await;
                info!("broker connected");
                client = Some(c);
                eventloop = Some(el);
                backoff.reset(std::time::Duration::from_secs(2));
                state = ReconnectState::Work;
            }

            ReconnectState::Work => {
                let (Some(c), Some(el)) = (client.as_ref(), eventloop.as_mut()) else {
                    state = ReconnectState::Init;
                    continue;
                };

                tokio::select! {
                    outbound = outbound_rx.recv() => {
                        match outbound {
                            Some(built) => {
                                let (qos, payload): (QoS, Vec<u8>) = match built.frame {
                                    OutboundFrame::Bytes(bytes) => (QoS::AtLeastOnce, bytes),
                                    OutboundFrame::Json(value) => {
                                        (QoS::AtLeastOnce, serde_json::to_vec(&value).unwrap_or_default())
                                    }
                                };
                                if let Err(e) = c.publish(&built.topic, qos, false, payload).await {
                                    warn!(topic = %built.topic, error = %e, "broker publish failed");
                                    state = ReconnectState::Error;
                                }
                            }
                            None => {
                                info!("outbound command channel closed, terminating broker task");
                                return;
                            }
                        }
                    }

                    polled = el.poll() => {
                        match polled {
                            Ok(Event::Incoming(Packet::Publish(publish))) => {
                                match classify_topic(&publish.topic, &config) {
                                    Some(device_family) => {
                                        debug!(topic = %publish.topic, "inbound broker frame");
                                        bus.publish_raw_frame(RawFrame {
                                            device_family,
                                            topic: publish.topic,
                                            payload: publish.payload.to_vec(),
                                        });
                                    }
                                    None => {
                                        warn!(topic = %publish.topic, "ignoring unrecognized broker topic");
                                    }
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!(error = %e, "broker event loop error");
                                bus.publish_error(ErrorEvent { component: "broker", message: e.to_string() });
                                state = ReconnectState::Error;
                            }
                        }
                    }
                }
            }

            ReconnectState::Error => {
                client = None;
                eventloop = None;
                let delay = backoff.next_delay();
                warn!(delay_secs = delay.as_secs(), "broker disconnected, backing off before reconnect");
                tokio::time::sleep(delay).await;
                state = ReconnectState::Init;
            }
        }
    }
}

/// Spawns the broker task and returns the sender side of its outbound
/// command channel, for the command builder to forward built frames into.
pub fn start_broker(bus: EventBus, config: BrokerConfig) -> mpsc::Sender<BuiltCommand> {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(broker_task(bus, config, rx));
    tx
}
