use libserialcom::driver::{ComDriver, DriverCaps, RxContext, TxContext};
use libserialcom::error::ComError;
use libserialcom::port::{PortConfig, PortRegistry, TransferTiming};
use libserialcom::sync::WaitBackend;
use libserialcom::types::{LowerId, PortId, SendMode};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// UART with TX wired straight back into RX, shifting bytes on `tx_start`
#[derive(Default)]
struct LoopbackUart {
    rx: Mutex<Option<RxContext>>,
    tx: Mutex<Option<TxContext>>,
    dropped: Mutex<usize>,
}

impl LoopbackUart {
    fn dropped(&self) -> usize {
        *self.dropped.lock().unwrap()
    }
}

impl ComDriver for LoopbackUart {
    fn capabilities(&self) -> DriverCaps {
        DriverCaps::RX_CB | DriverCaps::TX_CB
    }

    fn bind_rx_cb(&self, _lower: LowerId, ctx: RxContext) {
        *self.rx.lock().unwrap() = Some(ctx);
    }

    fn bind_tx_cb(&self, _lower: LowerId, ctx: TxContext) {
        *self.tx.lock().unwrap() = Some(ctx);
    }

    fn tx_start(&self, _lower: LowerId, pending: usize) {
        let mut wire = vec![0u8; pending];
        let supplied = match self.tx.lock().unwrap().as_mut() {
            Some(tx) => tx.on_tx_space_freed(&mut wire).supplied,
            None => 0,
        };
        wire.truncate(supplied);

        if let Some(rx) = self.rx.lock().unwrap().as_mut() {
            if rx.on_rx_bytes(&wire).accepted < wire.len() {
                *self.dropped.lock().unwrap() += wire.len();
            }
        }
    }
}

fn open_loopback(registry: &PortRegistry, config: PortConfig) -> (Arc<LoopbackUart>, PortId) {
    let uart = Arc::new(LoopbackUart::default());
    let id = registry.open_port(uart.clone(), 1, config).unwrap();
    (uart, id)
}

fn receive_exactly(registry: &PortRegistry, id: PortId, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut buf = [0u8; 16];
    let start = Instant::now();
    while out.len() < len && start.elapsed() < Duration::from_secs(5) {
        let read = registry
            .receive(id, &mut buf, Duration::from_millis(50))
            .unwrap();
        out.extend_from_slice(&buf[..read]);
    }
    out
}

#[test]
fn test_loopback_echo() {
    let registry = PortRegistry::default();
    let (_uart, id) = open_loopback(&registry, PortConfig::duplex(64, 16));

    assert_eq!(registry.send_str(id, "hello"), Ok(5));
    assert_eq!(registry.receive_byte_len(id), Ok(5));
    assert_eq!(registry.receive_byte_peek(id), Ok(Some(b'h')));
    assert_eq!(receive_exactly(&registry, id, 5), b"hello".to_vec());
}

#[test]
fn test_blocking_send_longer_than_tx_buffer() {
    let registry = PortRegistry::default();
    let (uart, id) = open_loopback(&registry, PortConfig::duplex(64, 8));

    let message: Vec<u8> = (0..40u8).collect();
    assert_eq!(registry.send(id, &message, SendMode::Blocking), Ok(40));
    assert_eq!(uart.dropped(), 0);
    assert_eq!(receive_exactly(&registry, id, 40), message);
}

#[test]
fn test_receiver_thread_wakes_on_arrival() {
    let registry = Arc::new(PortRegistry::default());
    let (_uart, id) = open_loopback(&registry, PortConfig::duplex(32, 32));

    let reader = {
        let registry = registry.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 32];
            let read = registry
                .receive(id, &mut buf, Duration::from_secs(5))
                .unwrap();
            buf[..read].to_vec()
        })
    };

    thread::sleep(Duration::from_millis(20));
    registry.send_nonblocking(id, b"wake").unwrap();

    let got = reader.join().unwrap();
    assert!(!got.is_empty());
    assert!(b"wake".starts_with(&got));
}

#[test]
fn test_poll_backend_port() {
    let registry = PortRegistry::default();
    let config = PortConfig::duplex(32, 32).with_wait(WaitBackend::poll());
    let (_uart, id) = open_loopback(&registry, config);

    registry.send_char_nonblocking(id, b'A').unwrap();
    registry.send_char(id, b'B').unwrap();
    assert_eq!(receive_exactly(&registry, id, 2), b"AB".to_vec());
}

#[test]
fn test_receive_overflow_is_reported_by_driver() {
    let registry = PortRegistry::default();
    let (uart, id) = open_loopback(&registry, PortConfig::duplex(4, 16));

    registry.send_nonblocking(id, b"abc").unwrap();
    registry.send_nonblocking(id, b"de").unwrap();

    assert_eq!(uart.dropped(), 2);
    assert_eq!(receive_exactly(&registry, id, 3), b"abc".to_vec());

    registry.flush_rx(id).unwrap();
    assert_eq!(registry.receive_byte_len(id), Ok(0));
}

#[test]
fn test_ports_are_independent() {
    let registry = PortRegistry::new(2).unwrap();
    let (_a_uart, a) = open_loopback(&registry, PortConfig::duplex(16, 16));
    let (_b_uart, b) = open_loopback(&registry, PortConfig::duplex(16, 16));
    assert_ne!(a, b);
    assert_eq!(registry.len(), 2);

    registry.send_nonblocking(a, b"to-a").unwrap();
    assert_eq!(registry.receive_byte_len(b), Ok(0));
    assert_eq!(receive_exactly(&registry, a, 4), b"to-a".to_vec());

    let third = registry.open_port(
        Arc::new(LoopbackUart::default()),
        3,
        PortConfig::default(),
    );
    assert_eq!(third, Err(ComError::RegistryFull { capacity: 2 }));
}

#[test]
fn test_invalid_handles_report_legacy_codes() {
    let registry = PortRegistry::default();
    let unbound = PortId::UNBOUND;

    let err = registry.send_nonblocking(unbound, b"x").unwrap_err();
    assert_eq!(err.status_code(), -1);
    assert!(!registry.available(unbound));
    assert!(!registry.is_valid(PortId::default()));
}

#[test]
fn test_blocking_send_timeout_without_transmitter() {
    // A transmitter that never shifts anything out
    struct StuckUart;
    impl ComDriver for StuckUart {
        fn capabilities(&self) -> DriverCaps {
            DriverCaps::RX_CB | DriverCaps::TX_CB
        }
    }

    let registry = PortRegistry::default();
    let timing = TransferTiming {
        send_timeout: Duration::from_millis(20),
        ..TransferTiming::default()
    };
    let id = registry
        .open_port(Arc::new(StuckUart), 1, PortConfig::tx_only(4).with_timing(timing))
        .unwrap();

    let err = registry.send_blocking(id, b"too long").unwrap_err();
    assert_eq!(err, ComError::SendTimeout);
    assert_eq!(err.status_code(), -3);

    let err = registry.send_nonblocking(id, b"x").unwrap_err();
    assert_eq!(err, ComError::BufferFull);
    assert!(err.is_transient());

    registry.flush_tx(id).unwrap();
    assert_eq!(registry.send_nonblocking(id, b"x"), Ok(1));
}
