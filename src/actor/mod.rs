//! Single-owner modem actor.
//!
//! The [`Modem`] must be driven by one task. [`ModemActor`] owns it, turns
//! driver callbacks into [`ModemEvent`]s and executes [`ModemRequest`]s
//! one at a time. [`runner`] puts it on its own thread behind the static
//! [`channels`].
//!
//! The actor itself is synchronous, so it is tested on the host by calling
//! [`ModemActor::serve`] and [`ModemActor::tick`] directly.

pub mod channels;
pub mod runner;

use heapless::{String, Vec};
use log::{debug, warn};

use crate::app::commands::ModemRequest;
use crate::app::events::{EVENT_PAYLOAD_MAX, EventPublisher, ModemEvent};
use crate::app::ports::{Clock, DownloadObserver, SerialPort};
use crate::error::Result;
use crate::modem::{Modem, MqttConnectOptions};
use crate::registry::{MqttClientId, SocketId};

/// Forwards download progress as events.
struct EventObserver {
    publish: EventPublisher,
}

impl DownloadObserver for EventObserver {
    fn pending(&mut self, status: u16, content_length: usize) {
        (self.publish)(ModemEvent::HttpPending {
            status,
            content_length,
        });
    }

    fn finished(&mut self) {
        (self.publish)(ModemEvent::HttpFinished);
    }

    fn failed(&mut self) {
        (self.publish)(ModemEvent::HttpFailed);
    }
}

/// Owns the modem and serves requests against it.
pub struct ModemActor<S, C> {
    modem: Modem<S, C>,
    publish: EventPublisher,
}

impl<S: SerialPort, C: Clock> ModemActor<S, C> {
    /// Take over `modem`, routing its close, SMS and MQTT callbacks to
    /// `publish`. Fails if an SMS handler is already registered.
    pub fn new(mut modem: Modem<S, C>, publish: EventPublisher) -> Result<Self> {
        modem.set_socket_close_handler(Box::new(move |id| {
            publish(ModemEvent::SocketClosed { id: id.get() });
        }));
        modem.set_sms_handler(Box::new(move |msg| publish(ModemEvent::Sms(msg.clone()))))?;
        modem.set_mqtt_message_handler(Box::new(move |client, topic, payload| {
            let mut t = String::new();
            let mut p = Vec::new();
            if t.push_str(topic).is_err() || p.extend_from_slice(payload).is_err() {
                warn!(
                    "mqtt message on {} too large for an event ({} bytes), dropped",
                    topic,
                    payload.len()
                );
                return;
            }
            publish(ModemEvent::MqttMessage {
                client: client.get(),
                topic: t,
                payload: p,
            });
        }));
        Ok(Self { modem, publish })
    }

    pub fn modem(&self) -> &Modem<S, C> {
        &self.modem
    }

    pub fn modem_mut(&mut self) -> &mut Modem<S, C> {
        &mut self.modem
    }

    pub fn into_inner(self) -> Modem<S, C> {
        self.modem
    }

    /// Execute `req` and publish its [`ModemEvent::Completed`].
    pub fn serve(&mut self, req: ModemRequest) {
        let request = req.kind();
        let result = self.handle(req);
        if let Err(e) = result {
            warn!("modem: {:?} failed: {}", request, e);
        }
        (self.publish)(ModemEvent::Completed { request, result });
    }

    /// Execute `req` without publishing its outcome.
    pub fn handle(&mut self, req: ModemRequest) -> Result<()> {
        debug!("modem: {:?}", req.kind());
        let m = &mut self.modem;
        match req {
            ModemRequest::OpenContext { cid, apn } => {
                m.setup_context(cid, &apn)?;
                m.open_pdp_context(cid)
            }
            ModemRequest::CloseContext { cid } => m.close_pdp_context(cid),
            ModemRequest::TcpConnect {
                id,
                host,
                port,
                cid,
                tls_profile: Some(profile),
            } => m.tcp_connect_tls(id, &host, port, cid, profile),
            ModemRequest::TcpConnect {
                id, host, port, cid, ..
            } => m.tcp_connect(id, &host, port, cid),
            ModemRequest::TcpSend { id, data } => m.tcp_send(id, &data),
            ModemRequest::TcpClose { id } => m.tcp_close(id),
            ModemRequest::MqttConnect {
                client,
                cid,
                host,
                port,
                client_id,
                username,
                password,
            } => {
                let id = MqttClientId::try_from(client)?;
                if !m.registry().session(id).is_configured() {
                    m.mqtt_init(client, cid)?;
                    m.mqtt_setup(client, None)?;
                }
                let opts = MqttConnectOptions {
                    client_id: &client_id,
                    username: username.as_deref(),
                    password: password.as_deref(),
                    host: &host,
                    port,
                    clean_session: true,
                };
                m.mqtt_connect(client, &opts)
            }
            ModemRequest::MqttSubscribe { client, topic, qos } => {
                m.mqtt_subscribe(client, &[(topic.as_str(), qos)])
            }
            ModemRequest::MqttPublish {
                client,
                topic,
                payload,
                qos,
                retain,
            } => m
                .mqtt_publish(client, &topic, &payload, qos, retain)
                .map(|_| ()),
            ModemRequest::MqttDisconnect { client } => m.mqtt_disconnect(client),
            ModemRequest::HttpDownload { url, filename } => m.http_get_download(
                &url,
                &filename,
                Box::new(EventObserver {
                    publish: self.publish,
                }),
            ),
            ModemRequest::SendSms { number, text } => m.sms_send(&number, &text),
            ModemRequest::LogStatus => {
                m.log_status();
                Ok(())
            }
        }
    }

    /// One scheduler tick: [`Modem::poll`], then hand every buffered socket
    /// byte to the publisher.
    pub fn tick(&mut self) {
        self.modem.poll();
        for id in SocketId::all() {
            self.forward_socket_data(id);
        }
    }

    fn forward_socket_data(&mut self, id: SocketId) {
        let mut chunk = [0u8; EVENT_PAYLOAD_MAX];
        loop {
            let n = match self.modem.tcp_recv(id.get(), &mut chunk) {
                Ok(0) => return,
                Ok(n) => n,
                Err(e) => {
                    debug!("socket {} recv: {}", id, e);
                    return;
                }
            };
            let mut data = Vec::new();
            // `chunk` is exactly the event capacity.
            let _ = data.extend_from_slice(&chunk[..n]);
            debug!("socket {} forwarded {} bytes", id, n);
            (self.publish)(ModemEvent::SocketData {
                id: id.get(),
                data,
            });
        }
    }
}
