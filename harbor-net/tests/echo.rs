//! End-to-end TCP round-trips against a live server with an echo handler.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use harbor_net::{ByteBuffer, ConnectionHandler, TcpServer};

struct Echo;

impl ConnectionHandler for Echo {
    fn poll(&mut self, read: &mut ByteBuffer, write: &mut ByteBuffer) {
        let mut chunk = [0u8; 512];
        loop {
            let n = read.read(&mut chunk);
            if n == 0 {
                break;
            }
            write.append(&chunk[..n]);
        }
    }
}

fn echo_server() -> TcpServer {
    let server = TcpServer::new(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(|| Box::new(Echo)),
    )
    .unwrap();
    server.serve().unwrap();
    server
}

fn connect(server: &TcpServer) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

#[test]
fn echo_round_trip() {
    let server = echo_server();
    let mut client = connect(&server);

    client.write_all(b"hello world").unwrap();
    let mut reply = [0u8; 11];
    client.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"hello world");

    server.shutdown();
}

#[test]
fn chunked_conversation_preserves_every_byte() {
    let server = echo_server();
    let mut client = connect(&server);

    let mut reply = [0u8; 256];
    for round in 0u32..50 {
        let chunk: Vec<u8> = (0..256u32).map(|i| (i ^ round) as u8).collect();
        client.write_all(&chunk).unwrap();
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply[..], &chunk[..], "round {round}");
    }

    server.shutdown();
}

#[test]
fn two_clients_are_isolated() {
    let server = echo_server();
    let mut first = connect(&server);
    let mut second = connect(&server);

    first.write_all(b"from-first").unwrap();
    second.write_all(b"from-second").unwrap();

    let mut reply = [0u8; 11];
    second.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"from-second");

    let mut reply = [0u8; 10];
    first.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"from-first");

    server.shutdown();
}

#[test]
fn server_survives_a_client_hangup() {
    let server = echo_server();

    {
        let mut doomed = connect(&server);
        doomed.write_all(b"bye").unwrap();
        // Dropped here; the server reaps the connection on EOF.
    }
    std::thread::sleep(Duration::from_millis(50));

    let mut client = connect(&server);
    client.write_all(b"still here").unwrap();
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"still here");

    server.shutdown();
}

#[test]
fn local_addr_requires_serving() {
    let server = TcpServer::new(
        "127.0.0.1:0".parse().unwrap(),
        Box::new(|| Box::new(Echo)),
    )
    .unwrap();
    assert!(server.local_addr().is_err());
}
