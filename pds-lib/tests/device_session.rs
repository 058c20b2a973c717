//! Tests for the device session over an in-memory stream

mod common;

use common::*;
use pds_lib::device::{DeviceConfig, Pds100g, StreamTransport};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

/// Play the device side: read each command frame, answer with the canned reply
/// in small pieces, and return the frames that arrived.
async fn simulated_device(mut stream: DuplexStream, replies: Vec<Vec<u8>>, piece: usize) -> Vec<Vec<u8>> {
    let mut commands = Vec::new();
    for reply in replies {
        let mut frame = Vec::new();
        loop {
            let byte = stream.read_u8().await.expect("host closed the link");
            frame.push(byte);
            if byte == 0x03 {
                break;
            }
        }
        commands.push(frame);

        for chunk in reply.chunks(piece) {
            stream.write_all(chunk).await.expect("host closed the link");
            stream.flush().await.expect("flush");
            tokio::task::yield_now().await;
        }
    }
    commands
}

fn session(stream: DuplexStream) -> Pds100g<StreamTransport<DuplexStream>> {
    let config = DeviceConfig::default().with_read_timeout(Duration::from_millis(500));
    Pds100g::with_config(StreamTransport::with_chunk_size(stream, 37), config)
}

#[tokio::test]
async fn test_fetch_latest_then_previous() {
    let (host, device) = duplex(64);
    let latest = spectrum_reply(&HeaderFields { index: "007", ..HeaderFields::default() }, &sample_counts(512));
    let previous = spectrum_reply(
        &HeaderFields {
            index: "006",
            bins: "1024",
            ..HeaderFields::default()
        },
        &sample_counts(1024),
    );
    let device_task = tokio::spawn(simulated_device(device, vec![latest, previous], 23));

    let mut pds = session(host);
    let first = pds.fetch_spectrum().await.unwrap();
    assert_eq!(first.header.spectrum_index, 7);
    assert_eq!(first.counts.len(), 512);

    let second = pds.fetch_spectrum().await.unwrap();
    assert_eq!(second.header.spectrum_index, 6);
    assert_eq!(second.counts.len(), 1024);
    assert_eq!(second.counts[1023], 0);
    assert!(pds.assembler().is_idle());

    let commands = device_task.await.unwrap();
    assert_eq!(commands, vec![b"\x02G22000\x03".to_vec(), b"\x02G22002\x03".to_vec()]);
}

#[tokio::test]
async fn test_request_serial_number() {
    let (host, device) = duplex(16);
    let device_task = tokio::spawn(simulated_device(device, vec![serial_reply("PD100123")], 5));

    let mut pds = session(host);
    assert_eq!(pds.request_serial_number().await.unwrap(), "PD100123");

    let commands = device_task.await.unwrap();
    assert_eq!(commands, vec![b"\x02G18\x03".to_vec()]);
}

#[tokio::test]
async fn test_progress_events_reach_callback() {
    let (host, device) = duplex(64);
    let reply = spectrum_reply(&HeaderFields::default(), &sample_counts(512));
    let device_task = tokio::spawn(simulated_device(device, vec![reply], 100));

    let mut pds = session(host);
    let mut lines = Vec::new();
    let record = pds
        .fetch_spectrum_with(|event| lines.push(event.to_string()))
        .await
        .unwrap();

    assert!(lines.first().unwrap().starts_with("Spectrum 7 20210322-142748 started with 512 bins"));
    assert!(lines.iter().any(|line| line.ends_with("of 512 fetched")));
    assert_eq!(
        lines.last().unwrap(),
        &format!("all 512 bins fetched, done for spectrum#7 Total counts: {}", record.total_counts)
    );
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_timeout_aborts_reply() {
    let (host, mut device) = duplex(64);
    let config = DeviceConfig::default().with_read_timeout(Duration::from_millis(50));
    let mut pds = Pds100g::with_config(StreamTransport::new(host), config);

    // Only the header ever arrives
    device.write_all(&HeaderFields::default().encode()).await.unwrap();

    let err = pds.fetch_spectrum().await.unwrap_err();
    assert!(matches!(err, PdsError::Timeout(_)), "got {:?}", err);
    assert!(pds.assembler().is_idle());
    assert_eq!(pds.assembler().buffered(), 0);
    drop(device);
}

#[tokio::test]
async fn test_link_closed_mid_reply() {
    let (host, device) = duplex(64);
    let reply = spectrum_reply(&HeaderFields::default(), &sample_counts(512));
    let truncated = reply[..300].to_vec();
    let device_task = tokio::spawn(async move {
        let mut device = device;
        let commands = simulated_device_once(&mut device, &truncated).await;
        drop(device);
        commands
    });

    let mut pds = session(host);
    let err = pds.fetch_spectrum().await.unwrap_err();
    assert!(matches!(err, PdsError::Transport(_)), "got {:?}", err);
    assert!(pds.assembler().is_idle());
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_malformed_reply_surfaces_error() {
    let (host, device) = duplex(64);
    let reply = spectrum_reply(
        &HeaderFields {
            gain: "x00",
            ..HeaderFields::default()
        },
        &sample_counts(512),
    );
    let device_task = tokio::spawn(simulated_device(device, vec![reply], 64));

    let mut pds = session(host);
    let err = pds.fetch_spectrum().await.unwrap_err();
    assert!(matches!(err, PdsError::MalformedHeader { field: "gain", .. }), "got {:?}", err);
    assert!(pds.assembler().is_idle());
    assert_eq!(pds.assembler().next_spectrum_command(), Command::GetLastSpectrum);
    // The device is still pushing the rest of the reply nobody reads
    device_task.abort();
}

async fn simulated_device_once(device: &mut DuplexStream, reply: &[u8]) -> Vec<u8> {
    let mut frame = Vec::new();
    loop {
        let byte = device.read_u8().await.expect("host closed the link");
        frame.push(byte);
        if byte == 0x03 {
            break;
        }
    }
    device.write_all(reply).await.expect("host closed the link");
    frame
}
