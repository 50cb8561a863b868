//! Socket open/send/receive/close against the scripted module.

use std::sync::{Arc, Mutex};

use bgxx::error::{AtError, ContextError, Error, IdKind, SocketError};
use bgxx::registry::{SOCKET_BUFFER_CAPACITY, SocketId, SocketState};

use crate::mock_modem::{attached_modem, connected_socket, modem};

const EMPTY_READ: &str = "\r\n+QIRD: 0\r\n\r\nOK\r\n";

// ── Open ──────────────────────────────────────────────────────

#[test]
fn connect_confirms_through_open_notification() {
    let (mut m, script) = attached_modem();
    script.on(
        "AT+QIOPEN=1,2,\"TCP\",\"example.com\",80,0,0",
        "\r\nOK\r\n\r\n+QIOPEN: 2,0\r\n",
    );

    m.tcp_connect(2, "example.com", 80, None).unwrap();

    assert!(m.tcp_connected(2));
    assert_eq!(m.socket_state(2), Some(SocketState::Connected));
    let socket = m.registry().socket(SocketId::new(2).unwrap());
    assert!(socket.is_active());
    assert!(socket.buffer().connected_since().is_some());
    assert_eq!(socket.endpoint().unwrap().host.as_str(), "example.com");
}

#[test]
fn tls_connect_uses_ssl_commands() {
    let (mut m, script) = attached_modem();
    script.on(
        "AT+QSSLOPEN=1,3,0,\"secure.example.com\",443,0",
        "\r\nOK\r\n\r\n+QSSLOPEN: 0,0\r\n",
    );

    m.tcp_connect_tls(0, "secure.example.com", 443, None, 3).unwrap();

    assert!(m.tcp_connected(0));
    assert!(m.registry().socket(SocketId::new(0).unwrap()).is_tls());
}

#[test]
fn out_of_range_socket_never_touches_the_channel() {
    let (mut m, script) = attached_modem();
    let err = m.tcp_connect(12, "example.com", 80, None).unwrap_err();
    assert_eq!(err, Error::InvalidId(IdKind::Socket, 12));
    assert!(script.commands().is_empty());
    assert!(!m.tcp_connected(12));
    assert_eq!(m.tcp_available(12), 0);
}

#[test]
fn connect_requires_an_attached_context() {
    let (mut m, script) = modem();
    let err = m.tcp_connect(0, "example.com", 80, None).unwrap_err();
    assert_eq!(err, Error::Context(ContextError::NotConnected));
    assert!(script.commands().is_empty());
}

#[test]
fn refused_open_rolls_back_and_reads_the_error() {
    let (mut m, script) = attached_modem();
    script
        .on(
            "AT+QIOPEN=1,1,\"TCP\",\"example.com\",81,0,0",
            "\r\nOK\r\n\r\n+QIOPEN: 1,566\r\n",
        )
        .on("AT+QICLOSE=1", "\r\nOK\r\n")
        .on("AT+QIGETERROR", "\r\n+QIGETERROR: 566,\"socket connect failed\"\r\n\r\nOK\r\n");

    let err = m.tcp_connect(1, "example.com", 81, None).unwrap_err();

    assert_eq!(err, Error::Socket(SocketError::OpenFailed(566)));
    assert!(!m.tcp_connected(1));
    assert_eq!(m.socket_state(1), Some(SocketState::Inactive));
    assert_eq!(script.remaining(), 0);
}

#[test]
fn open_without_confirmation_times_out() {
    let (mut m, script) = attached_modem();
    script
        .on("AT+QIOPEN=1,4,\"TCP\",\"example.com\",80,0,0", "\r\nOK\r\n")
        .on("AT+QICLOSE=4", "\r\nOK\r\n")
        .on("AT+QIGETERROR", "\r\n+QIGETERROR: 0,\"operation successful\"\r\n\r\nOK\r\n");

    let err = m.tcp_connect(4, "example.com", 80, None).unwrap_err();
    assert_eq!(err, Error::At(AtError::Timeout));
    assert!(!m.tcp_connected(4));
}

// ── Send ──────────────────────────────────────────────────────

#[test]
fn send_goes_through_the_prompt() {
    let (mut m, script) = connected_socket(0);
    script
        .on("AT+QISEND=0,5", "\r\n> ")
        .on_raw(b"hello", b"\r\nSEND OK\r\n");

    m.tcp_send(0, b"hello").unwrap();

    assert!(script.written().ends_with(b"AT+QISEND=0,5\r\nhello"));
}

#[test]
fn send_fail_is_reported() {
    let (mut m, script) = connected_socket(0);
    script
        .on("AT+QISEND=0,3", "\r\n> ")
        .on_raw(b"abc", b"\r\nSEND FAIL\r\n");
    assert_eq!(m.tcp_send(0, b"abc"), Err(Error::At(AtError::Rejected)));
}

#[test]
fn send_rejects_oversized_payloads_and_closed_sockets() {
    let (mut m, script) = connected_socket(0);
    let big = vec![0u8; bgxx::modem::MAX_SEND_LEN + 1];
    assert_eq!(
        m.tcp_send(0, &big),
        Err(Error::Socket(SocketError::PayloadTooLarge))
    );
    assert_eq!(
        m.tcp_send(1, b"x"),
        Err(Error::Socket(SocketError::NotConnected))
    );
    assert!(script.commands().is_empty());
}

// ── Receive ───────────────────────────────────────────────────

#[test]
fn recv_notification_is_drained_on_service() {
    let (mut m, script) = connected_socket(1);
    script
        .on("AT+QIRD=1,1500", "\r\n+QIRD: 5\r\nhello\r\nOK\r\n")
        .on("AT+QIRD=1,1495", EMPTY_READ);
    script.push("\r\n+QIURC: \"recv\",1\r\n");

    m.service();

    assert_eq!(script.remaining(), 0);
    assert_eq!(m.tcp_available(1), 5);
    let mut buf = [0u8; 16];
    assert_eq!(m.tcp_recv(1, &mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(m.tcp_available(1), 0);
}

#[test]
fn drained_payload_may_contain_line_terminators() {
    let (mut m, script) = connected_socket(0);
    script
        .on("AT+QIRD=0,1500", "\r\n+QIRD: 9\r\nab\r\nOK\r\nc\r\nOK\r\n")
        .on("AT+QIRD=0,1491", EMPTY_READ);
    script.push("\r\n+QIURC: \"recv\",0\r\n");

    m.service();

    let mut buf = [0u8; 16];
    let n = m.tcp_recv(0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"ab\r\nOK\r\nc");
}

#[test]
fn buffered_socket_is_drained_for_its_free_space_only() {
    let (mut m, script) = connected_socket(0);
    let mut reply = b"\r\n+QIRD: 1000\r\n".to_vec();
    reply.extend(std::iter::repeat_n(b'a', 1000));
    reply.extend_from_slice(b"\r\nOK\r\n");
    script.on_raw(b"AT+QIRD=0,1500\r\n", &reply);
    script.on("AT+QIRD=0,500", EMPTY_READ);

    script.push("\r\n+QIURC: \"recv\",0\r\n");
    m.service();

    assert_eq!(m.tcp_available(0), 1000);
    assert_eq!(script.commands(), ["AT+QIRD=0,1500", "AT+QIRD=0,500"]);
}

#[test]
fn full_buffer_skips_the_drain() {
    let (mut m, script) = connected_socket(0);
    let mut reply = format!("\r\n+QIRD: {}\r\n", SOCKET_BUFFER_CAPACITY).into_bytes();
    reply.extend(std::iter::repeat_n(b'z', SOCKET_BUFFER_CAPACITY));
    reply.extend_from_slice(b"\r\nOK\r\n");
    script.on_raw(b"AT+QIRD=0,1500\r\n", &reply);
    script.push("\r\n+QIURC: \"recv\",0\r\n");
    m.service();
    assert_eq!(m.tcp_available(0), SOCKET_BUFFER_CAPACITY);

    script.clear_log();
    script.push("\r\n+QIURC: \"recv\",0\r\n");
    m.service();
    assert!(script.commands().is_empty());
    // Pending follows the buffered length.
    assert!(m.registry().socket(SocketId::new(0).unwrap()).buffer().pending());
}

#[test]
fn recv_notification_inside_a_transaction_only_marks_pending() {
    let (mut m, script) = connected_socket(2);
    script
        .on("AT+CSQ", "\r\n+QIURC: \"recv\",2\r\n+CSQ: 20,99\r\n\r\nOK\r\n")
        .on("AT+QIRD=2,1500", "\r\n+QIRD: 2\r\nhi\r\nOK\r\n");

    m.query("AT+CSQ", "+CSQ: ", 500).unwrap();
    assert!(m.registry().socket(SocketId::new(2).unwrap()).buffer().pending());
    assert!(!script.sent("AT+QIRD=2,1500"));

    m.service();
    assert_eq!(m.tcp_available(2), 2);
}

// ── Close ─────────────────────────────────────────────────────

#[test]
fn close_fires_the_handler_only_on_ack() {
    let (mut m, script) = connected_socket(3);
    let closed = Arc::new(Mutex::new(Vec::new()));
    let sink = closed.clone();
    m.set_socket_close_handler(Box::new(move |id| sink.lock().unwrap().push(id.get())));

    script.on("AT+QICLOSE=3", "\r\nERROR\r\n");
    assert_eq!(m.tcp_close(3), Err(Error::At(AtError::Rejected)));
    let socket = m.registry().socket(SocketId::new(3).unwrap());
    assert!(!socket.is_active());
    assert!(socket.is_connected());
    assert!(closed.lock().unwrap().is_empty());

    script.on("AT+QICLOSE=3", "\r\nOK\r\n");
    m.tcp_close(3).unwrap();
    assert!(!m.tcp_connected(3));
    assert_eq!(*closed.lock().unwrap(), vec![3]);
}

#[test]
fn data_notification_during_close_leaves_nothing_pending() {
    let (mut m, script) = connected_socket(1);
    script.on("AT+QICLOSE=1", "\r\n+QIURC: \"recv\",1\r\n\r\nOK\r\n");

    m.tcp_close(1).unwrap();

    let socket = m.registry().socket(SocketId::new(1).unwrap());
    assert!(!socket.buffer().pending());
    assert!(!socket.is_connected());

    script.clear_log();
    m.service();
    assert!(script.commands().is_empty());
}

#[test]
fn peer_close_is_acknowledged_from_service() {
    let (mut m, script) = connected_socket(5);
    let closed = Arc::new(Mutex::new(Vec::new()));
    let sink = closed.clone();
    m.set_socket_close_handler(Box::new(move |id| sink.lock().unwrap().push(id.get())));

    script.on("AT+QICLOSE=5", "\r\nOK\r\n");
    script.push("\r\n+QIURC: \"closed\",5\r\n");
    m.service();

    assert!(!m.tcp_connected(5));
    assert_eq!(m.socket_state(5), Some(SocketState::Inactive));
    assert_eq!(*closed.lock().unwrap(), vec![5]);
}

#[test]
fn buffered_bytes_survive_a_peer_close() {
    let (mut m, script) = connected_socket(0);
    script
        .on("AT+QIRD=0,1500", "\r\n+QIRD: 3\r\nbye\r\nOK\r\n")
        .on("AT+QIRD=0,1497", EMPTY_READ)
        .on("AT+QICLOSE=0", "\r\nOK\r\n");
    script.push("\r\n+QIURC: \"recv\",0\r\n");
    m.service();
    script.push("\r\n+QIURC: \"closed\",0\r\n");
    m.service();

    assert_eq!(script.remaining(), 0);
    assert!(!m.tcp_connected(0));
    let mut buf = [0u8; 8];
    assert_eq!(m.tcp_recv(0, &mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"bye");
}
