use crate::bus::types::Bus;
use crate::config::config::{AccountCfg, TelegramCfg, TelegramMessagesCfg};
use crate::core::types::{Actor, FarmEvent, FarmEventKind};
use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCategory {
    Upgrades,
    AccountInfo,
    OtherErrors,
}

impl MessageCategory {
    pub fn of(kind: &FarmEventKind) -> Self {
        match kind {
            FarmEventKind::Purchased { .. }
            | FarmEventKind::PurchaseFailed { .. }
            | FarmEventKind::BalanceTooLow { .. } => MessageCategory::Upgrades,
            FarmEventKind::CycleSummary { .. } => MessageCategory::AccountInfo,
            FarmEventKind::CatalogFetchFailed { .. } => MessageCategory::OtherErrors,
        }
    }

    fn enabled_in(&self, messages: &TelegramMessagesCfg) -> bool {
        match self {
            MessageCategory::Upgrades => messages.upgrades,
            MessageCategory::AccountInfo => messages.account_info,
            MessageCategory::OtherErrors => messages.other_errors,
        }
    }
}

/// Forwards farm events to each account's Telegram chat. The subscription
/// is taken in `new`, so events published before `run` is first polled are
/// still delivered.
pub struct TelegramActor {
    pub rx: broadcast::Receiver<Arc<FarmEvent>>,
    pub client: Client,
    pub cfg: TelegramCfg,
    pub chat_ids: HashMap<String, String>,
    pub shutdown: CancellationToken,
}

impl TelegramActor {
    pub fn new(
        bus: Bus,
        client: Client,
        cfg: TelegramCfg,
        accounts: &[AccountCfg],
        shutdown: CancellationToken,
    ) -> TelegramActor {
        let chat_ids = accounts
            .iter()
            .filter(|a| !a.telegram_chat_id.is_empty())
            .map(|a| (a.name.clone(), a.telegram_chat_id.clone()))
            .collect();
        Self {
            rx: bus.farm_events.subscribe(),
            client,
            cfg,
            chat_ids,
            shutdown,
        }
    }

    /// Chat to deliver `event` to, if any.
    fn route(&self, event: &FarmEvent) -> Option<&str> {
        if !self.cfg.enabled || self.cfg.bot_token.is_empty() {
            return None;
        }
        if !MessageCategory::of(&event.kind).enabled_in(&self.cfg.messages) {
            return None;
        }
        self.chat_ids.get(&event.account).map(String::as_str)
    }

    async fn forward(&self, event: &FarmEvent) {
        let Some(chat_id) = self.route(event) else {
            debug!(ts_ms = event.ts_ms, "not forwarding {:?}", event.kind);
            return;
        };
        match self.send(chat_id, &event.render()).await {
            Ok(()) => debug!(ts_ms = event.ts_ms, account = %event.account, "telegram message sent"),
            Err(e) => error!("Failed to send telegram message: {:#}", e),
        }
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.cfg.api_url.trim_end_matches('/'),
            self.cfg.bot_token
        );
        self.client
            .get(&url)
            .query(&[("chat_id", chat_id), ("text", text)])
            .send()
            .await
            .context("requesting telegram sendMessage")?
            .error_for_status()
            .context("received non-success status from telegram")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Actor for TelegramActor {
    async fn run(mut self) -> Result<()> {
        info!("TelegramActor started");

        loop {
            // Queued events win over shutdown so final summaries still go out.
            let res = tokio::select! {
                biased;

                res = self.rx.recv() => res,

                _ = self.shutdown.cancelled() => {
                    info!("TelegramActor: shutdown requested");
                    break;
                }
            };

            match res {
                Ok(event) => self.forward(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    error!("TelegramActor lagged by {n} farm events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    error!("TelegramActor event channel closed");
                    break;
                }
            }
        }

        info!("TelegramActor stopped cleanly");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn actor_on(bus: &Bus, enabled: bool, api_url: &str) -> TelegramActor {
        let cfg = TelegramCfg {
            enabled,
            bot_token: "123:abc".to_string(),
            api_url: api_url.to_string(),
            messages: TelegramMessagesCfg::default(),
        };
        let accounts = vec![
            AccountCfg {
                name: "with-chat".to_string(),
                telegram_chat_id: "42".to_string(),
                ..AccountCfg::default()
            },
            AccountCfg {
                name: "no-chat".to_string(),
                ..AccountCfg::default()
            },
        ];
        let client = Client::builder().no_proxy().build().unwrap();
        TelegramActor::new(
            bus.clone(),
            client,
            cfg,
            &accounts,
            CancellationToken::new(),
        )
    }

    fn actor(enabled: bool) -> TelegramActor {
        actor_on(&Bus::new(), enabled, "http://127.0.0.1:9")
    }

    /// Minimal Bot API stand-in: answers every request with `200 {}` and
    /// reports its request line.
    async fn fake_bot_api() -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                let line = String::from_utf8_lossy(&head)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let _ = tx.send(line);
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}")
                    .await;
                let _ = stream.shutdown().await;
            }
        });
        (url, rx)
    }

    fn purchased(account: &str) -> FarmEvent {
        FarmEvent::new(
            account,
            FarmEventKind::Purchased {
                name: "CEO".to_string(),
                price: 1,
                profit_per_hour_delta: 1,
                level: 1,
            },
        )
    }

    #[test]
    fn test_route_by_account_and_category() {
        let a = actor(true);
        assert_eq!(a.route(&purchased("with-chat")), Some("42"));
        assert_eq!(a.route(&purchased("no-chat")), None);

        // otherErrors is off by default
        let failure = FarmEvent::new(
            "with-chat",
            FarmEventKind::CatalogFetchFailed {
                error: "x".to_string(),
            },
        );
        assert_eq!(a.route(&failure), None);
    }

    #[test]
    fn test_route_disabled() {
        assert_eq!(actor(false).route(&purchased("with-chat")), None);
    }

    #[tokio::test]
    async fn test_actor_stops_on_shutdown() {
        let a = actor(false);
        let shutdown = a.shutdown.clone();
        let handle = tokio::spawn(a.run());
        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_events_published_before_run_are_forwarded() {
        let (url, mut requests) = fake_bot_api().await;
        let bus = Bus::new();
        let a = actor_on(&bus, true, &url);
        let shutdown = a.shutdown.clone();

        bus.farm_events.publish(purchased("with-chat")).await.unwrap();
        let handle = tokio::spawn(a.run());

        let line = tokio::time::timeout(std::time::Duration::from_secs(5), requests.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(line.starts_with("GET /bot123:abc/sendMessage?"));
        assert!(line.contains("chat_id=42"));

        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_queued_events_are_drained_before_shutdown() {
        let (url, mut requests) = fake_bot_api().await;
        let bus = Bus::new();
        let a = actor_on(&bus, true, &url);

        for _ in 0..3 {
            bus.farm_events.publish(purchased("with-chat")).await.unwrap();
        }
        a.shutdown.cancel();
        a.run().await.unwrap();

        let mut sent = 0;
        while requests.try_recv().is_ok() {
            sent += 1;
        }
        assert_eq!(sent, 3);
    }
}
