use thread15d4::key_manager::{key_index, KeySet};
use thread15d4::mac::beacon::PROTOCOL_VERSION;
use thread15d4::mac::{security, NetworkName, ThreadBeacon};
use thread15d4_cat::{parse_ext_address, Decryption, FrameParser, Options};
use thread15d4_frame::*;

use strip_ansi_escapes::strip;

const MASTER_KEY: &str = "00112233445566778899aabbccddeeff";

fn plain(output: String) -> String {
    String::from_utf8(strip(output)).unwrap()
}

fn secured_data_frame(source: ExtAddress, key_sequence: u32) -> Vec<u8> {
    let master: [u8; 16] = hex::decode(MASTER_KEY).unwrap().try_into().unwrap();
    let keys = KeySet::derive(&master, key_sequence).unwrap();
    let repr = FrameBuilder::new_data(b"abcd")
        .set_sequence_number(3)
        .set_dst_pan_id(0xface)
        .set_dst_address(Address::Short(0x0400))
        .set_src_address(Address::Extended(source))
        .set_security(
            SecurityLevel::EncMic32,
            KeyIdentifier::Index(key_index(key_sequence)),
            5,
        )
        .finalize()
        .unwrap();
    let mut buffer = vec![0u8; repr.buffer_len()];
    repr.emit(&mut Frame::new_unchecked(&mut buffer[..]));
    security::secure_frame(&mut buffer, &keys.mac, &source).unwrap();
    buffer
}

#[test]
fn data_frame() {
    let input = "41d801cdabffffc7d9b514004b12002b000000";
    let output = plain(FrameParser::parse_hex(input).unwrap());
    assert_eq!(
        output,
        "Frame Control
  frame type: Data
  security: 0
  frame pending: 0
  ack request: 0
  pan id compression: 1
  dst addressing mode: Short
  src addressing mode: Extended
  frame version: 1 (Ieee802154_2006)
Sequence Number
  sequence number: 1
Addressing
  dst pan id: abcd
  dst addr: ffff (broadcast)
  src addr: 00:12:4b:00:14:b5:d9:c7
Payload
  [2b, 0, 0, 0]
"
    );
}

#[test]
fn beacon_request() {
    let output = plain(FrameParser::parse_hex("03082affffffff07").unwrap());
    assert!(output.contains("frame type: MacCommand\n"));
    assert!(output.contains("frame version: 0 (Ieee802154_2003)\n"));
    assert!(output.contains("dst addr: ffff (broadcast)\n"));
    assert!(output.contains("Command\n  command id: BeaconRequest\n"));
    assert!(!output.contains("Payload"));
}

#[test]
fn thread_beacon() {
    let beacon = ThreadBeacon {
        version: PROTOCOL_VERSION,
        joinable: true,
        network_name: NetworkName::new("thread15d4").unwrap(),
        extended_pan_id: [0xde, 0xad, 0x00, 0xbe, 0xef, 0x00, 0xca, 0xfe],
    };
    let mut thread = [0u8; 32];
    let len = beacon.emit(&mut thread).unwrap();
    let mut payload = [0u8; 64];
    let len = emit_beacon(&mut payload, true, true, &thread[..len]).unwrap();

    let repr = FrameBuilder::new_beacon(&payload[..len])
        .set_sequence_number(0x5a)
        .set_src_pan_id(0xface)
        .set_src_address(Address::Extended(ExtAddress::new([1, 2, 3, 4, 5, 6, 7, 8])))
        .finalize()
        .unwrap();
    let mut buffer = vec![0u8; repr.buffer_len()];
    repr.emit(&mut Frame::new_unchecked(&mut buffer[..]));

    let output = plain(FrameParser::parse(&buffer).unwrap());
    assert!(output.contains("src pan id: face\n"));
    assert!(output.contains("src addr: 01:02:03:04:05:06:07:08\n"));
    assert!(output.contains("pan coordinator: 1\n  association permit: 1\n"));
    assert!(output.contains(
        "Thread Beacon
  version: 2
  joinable: 1
  network name: thread15d4
  extended pan id: dead00beef00cafe
"
    ));
}

#[test]
fn frame_check_sequence() {
    let options = Options {
        fcs: true,
        ..Default::default()
    };
    let valid = plain(
        FrameParser::parse_hex_with("41d801cdabffffc7d9b514004b12002b000000805d", &options)
            .unwrap(),
    );
    assert!(valid.contains("Frame Check Sequence\n  fcs: 5d80 (valid)\n"));
    assert!(valid.contains("Payload\n  [2b, 0, 0, 0]\n"));

    let invalid = plain(
        FrameParser::parse_hex_with("41d801cdabffffc7d9b514004b12002b000000815d", &options)
            .unwrap(),
    );
    assert!(invalid.contains("fcs: 5d81 (invalid)\n"));
}

#[test]
fn decrypts_secured_frame() {
    let source = ExtAddress::new([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0]);
    let frame = secured_data_frame(source, 7);
    let input = hex::encode(&frame);

    let without_key = plain(FrameParser::parse_hex(&input).unwrap());
    assert!(without_key.contains("security level: EncMic32\n"));
    assert!(without_key.contains("frame counter: 5\n"));
    assert!(without_key.contains("key index: 8\n"));
    assert!(!without_key.contains("[61, 62, 63, 64]"));

    let options = Options {
        fcs: false,
        decryption: Some(Decryption::from_hex(MASTER_KEY, 7, None).unwrap()),
    };
    let output = plain(FrameParser::parse_hex_with(&input, &options).unwrap());
    assert!(output.contains("key sequence: 7\n  mic: valid\n"));
    assert!(output.contains("Payload\n  [61, 62, 63, 64]\n"));

    // a neighboring key sequence is found through the key index
    let options = Options {
        fcs: false,
        decryption: Some(Decryption::from_hex(MASTER_KEY, 6, None).unwrap()),
    };
    let output = plain(FrameParser::parse_hex_with(&input, &options).unwrap());
    assert!(output.contains("key sequence: 7\n"));

    let options = Options {
        fcs: false,
        decryption: Some(
            Decryption::from_hex("ffeeddccbbaa99887766554433221100", 7, None).unwrap(),
        ),
    };
    let output = plain(FrameParser::parse_hex_with(&input, &options).unwrap());
    assert!(output.contains("mic: invalid\n"));
    assert!(!output.contains("[61, 62, 63, 64]"));
}

#[test]
fn command_payload() {
    // association response: short address 0x0401, successful
    let repr = FrameBuilder::new_command(CommandId::AssociationResponse, &[0x01, 0x04, 0x00])
        .set_sequence_number(1)
        .set_dst_pan_id(0xface)
        .set_dst_address(Address::Extended(ExtAddress::new([2; 8])))
        .set_src_address(Address::Extended(ExtAddress::new([1; 8])))
        .set_ack_request(true)
        .finalize()
        .unwrap();
    let mut buffer = vec![0u8; repr.buffer_len()];
    repr.emit(&mut Frame::new_unchecked(&mut buffer[..]));

    let output = plain(FrameParser::parse(&buffer).unwrap());
    assert!(output.contains("ack request: 1\n"));
    assert!(output.contains("command id: AssociationResponse\n"));
    assert!(output.contains("short address: 0401\n"));
    assert!(output.contains("status: Successful\n"));
}

#[test]
fn rejects_bad_input() {
    assert!(FrameParser::parse_hex("zz").is_err());
    assert!(FrameParser::parse_hex("41d8").is_err());
    assert!(Decryption::from_hex("0011", 0, None).is_err());
    assert_eq!(
        parse_ext_address("12:34:56:78:9a:bc:de:f0").unwrap(),
        ExtAddress::new([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0])
    );
    assert!(parse_ext_address("1234").is_err());
}
