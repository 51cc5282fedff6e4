//! End-to-end call scenarios over a scripted bus

use chaino::core::protocol::checksum::header_checksum;
use chaino::core::protocol::{decode_request, encode_response, BusRetryPolicy, Packet, Status};
use chaino::core::registry::share_bus;
use chaino::core::session::{BusSession, SessionOptions};
use chaino::core::transport::mock::MockBus;
use chaino::{args, CallErrorKind, Fault, RemoteCall};

const TARGET: u8 = 0x42;

fn session(bus: &MockBus, policy: BusRetryPolicy) -> BusSession {
    let options = SessionOptions {
        bus_policy: policy,
        ..SessionOptions::default()
    };
    BusSession::new(share_bus(bus.clone()), TARGET, &options)
}

fn queue_nak(bus: &MockBus) {
    bus.queue_header(b'E', 0, header_checksum(b'E', 0));
}

#[tokio::test]
async fn request_uses_bus_form() {
    let bus = MockBus::with_devices(&[TARGET]);
    bus.queue_reply(&encode_response(Status::Success, &["Chaino_Hana"]));
    let session = session(&bus, BusRetryPolicy::default());

    let result = session.call(205, &args![255, 0, 16]).await.unwrap();
    assert!(result.as_str() == Some("Chaino_Hana"));

    let written = bus.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0, TARGET);
    let request = decode_request(&Packet::from_wire(written[0].1.clone())).unwrap();
    assert_eq!(request.address, None);
    assert_eq!(request.func_num, 205);
    assert_eq!(request.args, vec!["255", "0", "16"]);
}

#[tokio::test]
async fn header_checksum_mismatch_retries_exchange() {
    let bus = MockBus::new();
    bus.queue_header(b'S', 5, 0x00);
    bus.queue_reply(&encode_response(Status::Success, &["7"]));
    let session = session(&bus, BusRetryPolicy::ResendRequest);

    let result = session.call(14, &args![26]).await.unwrap();
    assert_eq!(result.parse::<u32>(), Some(7));
    assert_eq!(bus.written().len(), 2);

    let stats = session.stats();
    assert_eq!(stats.read_crc_errors, 1);
    assert_eq!(stats.corrupt_response, 1);
}

#[tokio::test]
async fn nak_header_with_resend_policy() {
    let bus = MockBus::new();
    queue_nak(&bus);
    bus.queue_reply(&encode_response(Status::Success, &[]));
    let session = session(&bus, BusRetryPolicy::ResendRequest);

    assert!(session.call(13, &args![13, true]).await.unwrap().is_none());
    let written = bus.written();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0], written[1]);
    assert_eq!(session.stats().write_crc_errors, 1);
}

#[tokio::test]
async fn nak_header_with_reread_policy() {
    let bus = MockBus::new();
    queue_nak(&bus);
    bus.queue_reply(&encode_response(Status::Success, &[]));
    let session = session(&bus, BusRetryPolicy::RereadHeader);

    assert!(session.call(13, &args![13, true]).await.unwrap().is_none());
    assert_eq!(bus.written().len(), 1);
    assert_eq!(session.stats().write_crc_errors, 1);

    let header_reads = bus.reads().iter().filter(|(_, len)| *len == 3).count();
    assert_eq!(header_reads, 2);
}

#[tokio::test]
async fn payload_checksum_failure_retries_exchange() {
    let bus = MockBus::new();
    let reply = encode_response(Status::Success, &["4095"]);
    let length = u8::try_from(reply.len()).unwrap();
    bus.queue_header(b'S', length, header_checksum(b'S', length));
    let mut corrupted = reply.as_bytes().to_vec();
    corrupted[3] ^= 0x01;
    bus.queue_read(corrupted);
    bus.queue_reply(&reply);
    let session = session(&bus, BusRetryPolicy::RereadHeader);

    let result = session.call(14, &args![26]).await.unwrap();
    assert_eq!(result.as_str(), Some("4095"));

    // A body failure always restarts the whole exchange, whatever the policy
    assert_eq!(bus.written().len(), 2);
    assert_eq!(session.stats().corrupt_response, 1);
}

#[tokio::test]
async fn remote_failure_on_bus() {
    let bus = MockBus::new();
    bus.queue_reply(&encode_response(Status::Failure, &["bad pin"]));
    let session = session(&bus, BusRetryPolicy::default());

    let err = session.call(12, &args![99]).await.unwrap_err();
    assert_eq!(err.kind, CallErrorKind::Remote);
    assert_eq!(err.address, TARGET);
    assert_eq!(bus.written().len(), 1);
}

#[tokio::test]
async fn absent_device_exhausts_budget() {
    let bus = MockBus::with_devices(&[0x10]);
    let session = session(&bus, BusRetryPolicy::default());

    let err = session.call(201, &[]).await.unwrap_err();
    assert_eq!(err.kind, CallErrorKind::RetriesExhausted(Fault::NoResponse));
    assert_eq!(err.address, TARGET);
    assert_eq!(session.stats().no_response, 3);
}

#[tokio::test]
async fn persistent_nak_reports_fault_class() {
    let bus = MockBus::new();
    for _ in 0..3 {
        queue_nak(&bus);
    }
    let session = session(&bus, BusRetryPolicy::default());

    let err = session.call(201, &[]).await.unwrap_err();
    assert_eq!(
        err.kind,
        CallErrorKind::RetriesExhausted(Fault::CorruptRequest)
    );
    assert!(err
        .to_string()
        .starts_with("max retries: peer reported corrupt request"));
}

#[tokio::test]
async fn failed_write_restarts_exchange() {
    let bus = MockBus::new();
    bus.fail_writes(1);
    bus.queue_reply(&encode_response(Status::Success, &["1"]));
    let session = session(&bus, BusRetryPolicy::RereadHeader);

    let result = session.call(12, &args![2]).await.unwrap();
    assert_eq!(result.as_str(), Some("1"));

    // The failed write is logged too; no header is read after it
    assert_eq!(bus.written().len(), 2);
    assert_eq!(bus.reads().len(), 2);
    let stats = session.stats();
    assert_eq!(stats.no_response, 1);
    assert_eq!(stats.read_crc_errors, 1);
}

#[tokio::test]
async fn failed_header_read_restarts_exchange() {
    let bus = MockBus::new();
    bus.queue_read_error();
    bus.queue_reply(&encode_response(Status::Success, &[]));
    let session = session(&bus, BusRetryPolicy::RereadHeader);

    assert!(session.call(31, &[]).await.unwrap().is_none());
    assert_eq!(bus.written().len(), 2);
    assert_eq!(session.stats().no_response, 1);
}
