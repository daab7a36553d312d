//! Bounded TCP connect scanning.
//!
//! [`PortScanner`] probes a port range in waves: at most `max_in_flight`
//! connection attempts are spawned, all of them are awaited, then the next
//! wave starts. Socket usage is therefore capped by the wave size no matter
//! how large the range is. Open ports are recorded in the scan's
//! [`FindingLedger`] by the worker that found them.

use async_trait::async_trait;
use futures::future::join_all;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ScanConfiguration;
use crate::error::{Error, Result};
use crate::model::{FindingDraft, FindingLedger, Severity};

/// Inclusive port range with `1 <= low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    low: u16,
    high: u16,
}

impl PortRange {
    pub fn new(low: u16, high: u16) -> Result<Self> {
        if low == 0 || low > high {
            return Err(Error::InvalidRange { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn single(port: u16) -> Result<Self> {
        Self::new(port, port)
    }

    pub fn low(&self) -> u16 {
        self.low
    }

    pub fn high(&self) -> u16 {
        self.high
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.low..=self.high
    }

    pub fn len(&self) -> usize {
        usize::from(self.high - self.low) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self { low: 1, high: 1024 }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// Parses "80" or "1-1024".
impl FromStr for PortRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (low, high) = match s.split_once('-') {
            Some((low, high)) => (low.trim(), high.trim()),
            None => (s, s),
        };
        let low: u16 = low.parse().map_err(|_| format!("Invalid port: {}", low))?;
        let high: u16 = high.parse().map_err(|_| format!("Invalid port: {}", high))?;
        PortRange::new(low, high).map_err(|e| e.to_string())
    }
}

/// One connection attempt.
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// Returns true if `addr` accepted a connection within `timeout`.
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> bool;
}

/// Full TCP handshake probe.
pub struct TcpConnectProbe;

#[async_trait]
impl PortProbe for TcpConnectProbe {
    async fn probe(&self, addr: SocketAddr, connect_timeout: Duration) -> bool {
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                trace!(%addr, error = %e, "connect refused");
                false
            }
            Err(_) => {
                trace!(%addr, "connect timed out");
                false
            }
        }
    }
}

pub struct PortScanner {
    probe: Arc<dyn PortProbe>,
    max_in_flight: usize,
    connect_timeout: Duration,
}

impl PortScanner {
    /// Scanner using the limits captured in a scan's configuration.
    pub fn new(probe: Arc<dyn PortProbe>, config: &ScanConfiguration) -> Self {
        Self::with_limits(probe, config.max_threads, config.connect_timeout())
    }

    pub fn with_limits(probe: Arc<dyn PortProbe>, max_in_flight: usize, connect_timeout: Duration) -> Self {
        Self {
            probe,
            max_in_flight: max_in_flight.max(1),
            connect_timeout,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub async fn scan(
        &self,
        ip: IpAddr,
        range: PortRange,
        ledger: &Arc<FindingLedger>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u16>> {
        let ports: Vec<u16> = range.ports().collect();
        self.scan_ports(ip, &ports, ledger, cancel).await
    }

    /// Probes `ports` and returns the open ones. An empty slice is not an
    /// error. Unreachable hosts just produce an empty result.
    pub async fn scan_ports(
        &self,
        ip: IpAddr,
        ports: &[u16],
        ledger: &Arc<FindingLedger>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u16>> {
        let mut open = Vec::new();

        for (wave_index, wave) in ports.chunks(self.max_in_flight).enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            trace!(%ip, wave = wave_index, size = wave.len(), "dispatching wave");

            let workers: Vec<_> = wave
                .iter()
                .map(|&port| {
                    let probe = Arc::clone(&self.probe);
                    let ledger = Arc::clone(ledger);
                    let cancel = cancel.clone();
                    let connect_timeout = self.connect_timeout;

                    tokio::spawn(async move {
                        let addr = SocketAddr::new(ip, port);
                        let is_open = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => false,
                            open = probe.probe(addr, connect_timeout) => open,
                        };
                        if !is_open {
                            return None;
                        }
                        debug!(%ip, port, "port open");
                        ledger.record(open_port_finding(ip, port));
                        Some(port)
                    })
                })
                .collect();

            let mut worker_error = None;
            for joined in join_all(workers).await {
                match joined {
                    Ok(Some(port)) => open.push(port),
                    Ok(None) => {}
                    Err(e) => worker_error = Some(e),
                }
            }
            if let Some(e) = worker_error {
                return Err(Error::module("Port Scanner", format!("probe worker failed: {}", e)));
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        Ok(open)
    }
}

fn open_port_finding(ip: IpAddr, port: u16) -> FindingDraft {
    FindingDraft::new("Open Port", format!("Port {} is open.", port), Severity::Low)
        .with_component(format!("Port {}", port))
        .with_evidence(format!("Port {} on {} is open.", port, ip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScanId;
    use std::collections::{BTreeSet, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Probe that answers from a fixed set and tracks peak concurrency.
    struct FakeProbe {
        open: HashSet<u16>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn new(open: &[u16], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                open: open.iter().copied().collect(),
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PortProbe for FakeProbe {
        async fn probe(&self, addr: SocketAddr, _timeout: Duration) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.open.contains(&addr.port())
        }
    }

    /// Host that never answers: every attempt runs into the timeout.
    struct Unreachable {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PortProbe for Unreachable {
        async fn probe(&self, _addr: SocketAddr, limit: Duration) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            timeout(limit, std::future::pending::<()>()).await.is_ok()
        }
    }

    fn ledger() -> Arc<FindingLedger> {
        Arc::new(FindingLedger::new(ScanId(1)))
    }

    const LOCALHOST: IpAddr = IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);

    #[test]
    fn test_port_range_validation() {
        assert!(matches!(
            PortRange::new(0, 100),
            Err(Error::InvalidRange { low: 0, high: 100 })
        ));
        assert!(matches!(
            PortRange::new(500, 10),
            Err(Error::InvalidRange { low: 500, high: 10 })
        ));
        assert_eq!(PortRange::new(1, 65535).unwrap().len(), 65535);
        assert_eq!(PortRange::single(443).unwrap().len(), 1);
    }

    #[test]
    fn test_port_range_parse() {
        assert_eq!("80".parse::<PortRange>().unwrap(), PortRange::single(80).unwrap());
        assert_eq!("1-1024".parse::<PortRange>().unwrap(), PortRange::default());
        assert!("0-10".parse::<PortRange>().is_err());
        assert!("90-80".parse::<PortRange>().is_err());
        assert!("http".parse::<PortRange>().is_err());
        assert!("1-70000".parse::<PortRange>().is_err());
    }

    #[tokio::test]
    async fn test_open_set_is_independent_of_wave_size() {
        let expected: BTreeSet<u16> = [3, 17, 18, 64, 99].into_iter().collect();
        let range = PortRange::new(1, 100).unwrap();

        for limit in [1, 2, 7, 32, 100, 500] {
            let probe = FakeProbe::new(&[3, 17, 18, 64, 99, 150], Duration::from_millis(1));
            let scanner = PortScanner::with_limits(probe.clone(), limit, Duration::from_secs(1));
            let ledger = ledger();

            let open = scanner
                .scan(LOCALHOST, range, &ledger, &CancellationToken::new())
                .await
                .unwrap();

            let found: BTreeSet<u16> = open.into_iter().collect();
            assert_eq!(found, expected, "limit {}", limit);
            assert_eq!(ledger.len(), expected.len());
            assert_eq!(probe.calls.load(Ordering::SeqCst), 100);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_limit() {
        for limit in [1, 3, 8, 25] {
            let probe = FakeProbe::new(&[], Duration::from_millis(5));
            let scanner = PortScanner::with_limits(probe.clone(), limit, Duration::from_secs(1));

            scanner
                .scan(
                    LOCALHOST,
                    PortRange::new(1000, 1099).unwrap(),
                    &ledger(),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();

            let peak = probe.peak.load(Ordering::SeqCst);
            assert!(peak <= limit, "peak {} exceeded limit {}", peak, limit);
            assert!(peak >= 1);
        }
    }

    #[tokio::test]
    async fn test_open_port_findings_are_low_with_unique_ids() {
        let probe = FakeProbe::new(&[22, 80, 443], Duration::ZERO);
        let scanner = PortScanner::with_limits(probe, 2, Duration::from_secs(1));
        let ledger = ledger();

        scanner
            .scan(LOCALHOST, PortRange::new(1, 500).unwrap(), &ledger, &CancellationToken::new())
            .await
            .unwrap();

        let vulns = ledger.vulnerabilities();
        let ids: HashSet<u64> = vulns.iter().map(|v| v.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(vulns.iter().all(|v| v.severity == Severity::Low && v.name == "Open Port"));
        assert!(vulns.iter().any(|v| v.affected_component == "Port 443"));
    }

    #[tokio::test]
    async fn test_empty_port_list_is_not_an_error() {
        let probe = FakeProbe::new(&[80], Duration::ZERO);
        let scanner = PortScanner::with_limits(probe.clone(), 4, Duration::from_secs(1));
        let ledger = ledger();

        let open = scanner
            .scan_ports(LOCALHOST, &[], &ledger, &CancellationToken::new())
            .await
            .unwrap();

        assert!(open.is_empty());
        assert!(ledger.is_empty());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_host_times_out_to_empty_result() {
        let probe = Arc::new(Unreachable {
            calls: AtomicUsize::new(0),
        });
        let scanner = PortScanner::with_limits(probe.clone(), 10, Duration::from_millis(50));
        let ledger = ledger();
        let started = std::time::Instant::now();

        let open = scanner
            .scan(
                IpAddr::V4(std::net::Ipv4Addr::new(192, 0, 2, 1)),
                PortRange::new(1, 20).unwrap(),
                &ledger,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(open.is_empty());
        assert!(ledger.is_empty());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 20);
        // Two waves, each bounded by the connect timeout.
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_opens_nothing() {
        let probe = FakeProbe::new(&[80], Duration::ZERO);
        let scanner = PortScanner::with_limits(probe.clone(), 4, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = scanner
            .scan(LOCALHOST, PortRange::new(1, 100).unwrap(), &ledger(), &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_scan_stops_between_waves() {
        let probe = FakeProbe::new(&[], Duration::from_millis(20));
        let scanner = PortScanner::with_limits(probe.clone(), 5, Duration::from_secs(1));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let result = scanner
            .scan(LOCALHOST, PortRange::new(1, 1000).unwrap(), &ledger(), &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(probe.calls.load(Ordering::SeqCst) < 1000);
    }

    #[tokio::test]
    async fn test_tcp_connect_probe_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        // Bind then drop to get a port that is very likely closed.
        let closed_port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let scanner = PortScanner::with_limits(Arc::new(TcpConnectProbe), 2, Duration::from_millis(500));
        let ledger = ledger();
        let open = scanner
            .scan_ports(LOCALHOST, &[open_port, closed_port], &ledger, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(open, vec![open_port]);
        assert_eq!(ledger.len(), 1);
    }
}
