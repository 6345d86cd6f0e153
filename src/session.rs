// src/session.rs
//! Per-connection session: identify the client, then decode and publish lines

use crate::{
    config::ClientRegistry,
    gps::{nmea, Sentence, SentenceError, SentenceKind},
    publish::Publisher,
};
use log::{debug, error, info, warn};
use std::{net::IpAddr, sync::Arc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

pub const TOPIC_ROOT: &str = "gps-proxy";

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines: u64,
    pub rejected_lines: u64,
    pub published: u64,
    pub publish_failures: u64,
}

/// A connection from a known client
pub struct Session {
    client: String,
    base_topic: String,
    publisher: Arc<dyn Publisher>,
}

impl Session {
    /// Resolve the peer to a client name; unknown peers get no session
    pub fn identify(
        peer: IpAddr,
        registry: &ClientRegistry,
        publisher: Arc<dyn Publisher>,
    ) -> Option<Self> {
        registry
            .resolve(peer)
            .map(|name| Self::new(name, publisher))
    }

    pub fn new(client: &str, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            client: client.to_string(),
            base_topic: format!("{}/{}/", TOPIC_ROOT, client),
            publisher,
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Read lines until the stream ends or fails
    pub async fn run<R>(&self, stream: R) -> SessionStats
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        let mut stats = SessionStats::default();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    if !line.is_empty() {
                        self.handle_line(line, &mut stats).await;
                    }
                }
                Err(e) => {
                    debug!("[{}] Read error: {}", self.client, e);
                    break;
                }
            }
        }

        stats
    }

    /// Dispatch one trimmed line and publish what it produced, in order
    pub async fn handle_line(&self, line: &str, stats: &mut SessionStats) {
        stats.lines += 1;

        let sentence = match nmea::parse_sentence(line) {
            Ok(sentence) => sentence,
            Err(e) => {
                stats.rejected_lines += 1;
                match e {
                    SentenceError::Malformed { .. } => warn!("[{}] {}: {}", self.client, e, line),
                    _ => warn!("[{}] {}", self.client, e),
                }
                return;
            }
        };

        for (field, e) in &sentence.rejected {
            debug!(
                "[{}] {}/{} not published ({}): {}",
                self.client,
                sentence.kind,
                field,
                e.code(),
                e
            );
        }
        if sentence.kind == SentenceKind::Rmc {
            self.log_rmc(&sentence);
        }

        for measurement in &sentence.measurements {
            let topic = format!("{}{}", self.base_topic, measurement.topic_suffix());
            match self.publisher.publish(&topic, &measurement.value).await {
                Ok(()) => stats.published += 1,
                Err(e) => {
                    stats.publish_failures += 1;
                    error!("[{}] Failed to publish {}: {}", self.client, topic, e);
                }
            }
        }
    }

    fn log_rmc(&self, sentence: &Sentence) {
        let field = |name: &str| sentence.value(name).unwrap_or("-");
        info!(
            "[{}] GPRMC: {}, {} {} speed {}",
            self.client,
            field("time"),
            field("lat_dms"),
            field("lon_dms"),
            field("speed_kmh")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GpsClient;
    use crate::publish::testing::RecordingPublisher;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W";

    fn session(sink: &Arc<RecordingPublisher>) -> Session {
        Session::new("rover1", Arc::clone(sink) as Arc<dyn Publisher>)
    }

    #[tokio::test]
    async fn test_gpgga_end_to_end() {
        let sink = Arc::new(RecordingPublisher::default());
        let input = format!("{}\r\n", GGA);

        let stats = session(&sink).run(input.as_bytes()).await;

        assert_eq!(stats.lines, 1);
        assert_eq!(stats.published, 10);
        assert_eq!(sink.value("gps-proxy/rover1/GPGGA/utc").as_deref(), Some("12:35:19"));
        assert_eq!(sink.value("gps-proxy/rover1/GPGGA/lat_dd").as_deref(), Some("48.117300"));
        assert_eq!(sink.value("gps-proxy/rover1/GPGGA/lon_dd").as_deref(), Some("11.516667"));
        assert_eq!(sink.value("gps-proxy/rover1/GPGGA/quality").as_deref(), Some("1"));
        assert_eq!(sink.value("gps-proxy/rover1/GPGGA/sats").as_deref(), Some("08"));
        assert_eq!(sink.value("gps-proxy/rover1/GPGGA/hdop").as_deref(), Some("0.9"));
        assert_eq!(sink.value("gps-proxy/rover1/GPGGA/alt").as_deref(), Some("545.4"));
        assert_eq!(sink.value("gps-proxy/rover1/GPGGA/alt_unit").as_deref(), Some("M"));
    }

    #[tokio::test]
    async fn test_gprmc_end_to_end() {
        let sink = Arc::new(RecordingPublisher::default());
        let input = format!("{}\n", RMC);

        session(&sink).run(input.as_bytes()).await;

        assert_eq!(
            sink.value("gps-proxy/rover1/GPRMC/date_time").as_deref(),
            Some("1994-03-23 12:35:19")
        );
        assert!(sink.value("gps-proxy/rover1/GPRMC/date_time_local").is_some());
        let speed: f64 = sink
            .value("gps-proxy/rover1/GPRMC/speed_kmh")
            .unwrap()
            .parse()
            .unwrap();
        assert!((speed - 41.49).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_publish_order_follows_field_order() {
        let sink = Arc::new(RecordingPublisher::default());
        let input = format!("{}\n$GPGSV,1,1,00\n", GGA);

        session(&sink).run(input.as_bytes()).await;

        let topics: Vec<String> = sink.published().into_iter().map(|(t, _)| t).collect();
        assert_eq!(topics.first().map(String::as_str), Some("gps-proxy/rover1/GPGGA/utc"));
        assert_eq!(topics[9], "gps-proxy/rover1/GPGGA/alt_unit");
        assert_eq!(topics.last().map(String::as_str), Some("gps-proxy/rover1/GPGSV/field_length"));
        assert_eq!(topics.len(), 11);
    }

    #[tokio::test]
    async fn test_rejected_lines_do_not_end_session() {
        let sink = Arc::new(RecordingPublisher::default());
        let input = format!("$GP\n$GPXYZ,1,2\n$GPGSA,A,3\n\n\u{fffd}\u{fffd}\n{}\n", GGA);

        let stats = session(&sink).run(input.as_bytes()).await;

        assert_eq!(stats.lines, 5);
        assert_eq!(stats.rejected_lines, 4);
        assert_eq!(stats.published, 10);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_not_fatal() {
        let sink = Arc::new(RecordingPublisher::default());
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(GGA.as_bytes());

        let stats = session(&sink).run(input.as_slice()).await;

        assert_eq!(stats.lines, 2);
        assert_eq!(stats.published, 10);
    }

    #[tokio::test]
    async fn test_publish_failure_continues() {
        let sink = Arc::new(RecordingPublisher::failing_on("lat_dms"));
        let input = format!("{}\n{}\n", GGA, GGA);

        let stats = session(&sink).run(input.as_bytes()).await;

        assert_eq!(stats.publish_failures, 2);
        assert_eq!(stats.published, 18);
        assert!(sink.value("gps-proxy/rover1/GPGGA/lat_dms").is_none());
    }

    #[test]
    fn test_identify() {
        let clients = vec![GpsClient {
            ip: "192.168.1.20".to_string(),
            name: "rover1".to_string(),
        }];
        let registry = ClientRegistry::from_clients(&clients).unwrap();
        let sink: Arc<dyn Publisher> = Arc::new(RecordingPublisher::default());

        let known = Session::identify("192.168.1.20".parse().unwrap(), &registry, Arc::clone(&sink));
        let known = known.expect("known client");
        assert_eq!(known.client(), "rover1");
        assert_eq!(known.base_topic(), "gps-proxy/rover1/");

        assert!(Session::identify("192.168.1.99".parse().unwrap(), &registry, sink).is_none());
    }
}
