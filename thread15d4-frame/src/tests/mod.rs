use super::*;

#[test]
fn parse_thread_beacon() {
    // Beacon frame from a Thread leader: extended source, no destination.
    let bytes = [
        0x00, 0xc0, 0x5a, 0xce, 0xfa, 0x01, 0x00, 0x00, 0x00, 0x00, 0x30, 0xb4, 0x18, 0xff, 0xcf,
        0x00, 0x00, 0x03, 0x21,
    ];
    let _ = env_logger::builder().is_test(true).try_init();

    let frame = Frame::new(&bytes[..]).unwrap();
    let repr = FrameRepr::parse(&frame).unwrap();
    log::debug!("{:?}", repr);
    assert_eq!(repr.frame_control.frame_type, FrameType::Beacon);
    assert_eq!(repr.addressing_fields.dst_address, Address::Absent);
    assert_eq!(repr.addressing_fields.src_pan_id, Some(0xface));
    assert_eq!(
        repr.addressing_fields.src_address,
        Address::Extended(ExtAddress([0x18, 0xb4, 0x30, 0, 0, 0, 0, 0x01]))
    );

    let beacon = BeaconPayload::new(repr.payload).unwrap();
    assert!(beacon.superframe_specification().association_permit());
    assert!(beacon.superframe_specification().pan_coordinator());
    assert_eq!(beacon.payload(), &[0x03, 0x21]);
}

#[test]
fn emit_beacon_frame() {
    let mut payload = [0u8; 8];
    let len = emit_beacon(&mut payload, true, true, &[0x03, 0x21]).unwrap();

    let repr = FrameBuilder::new_beacon(&payload[..len])
        .set_sequence_number(0x5a)
        .set_src_pan_id(0xface)
        .set_src_address(Address::Extended(ExtAddress([
            0x18, 0xb4, 0x30, 0, 0, 0, 0, 0x01,
        ])))
        .finalize()
        .unwrap();

    let mut buffer = vec![0u8; repr.buffer_len()];
    repr.emit(&mut Frame::new_unchecked(&mut buffer[..]));
    assert_eq!(
        buffer,
        [
            0x00, 0xc0, 0x5a, 0xce, 0xfa, 0x01, 0x00, 0x00, 0x00, 0x00, 0x30, 0xb4, 0x18, 0xff,
            0xcf, 0x00, 0x00, 0x03, 0x21,
        ]
    );
}

#[test]
fn data_request_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let repr = FrameBuilder::new_command(CommandId::DataRequest, &[])
        .set_sequence_number(0x10)
        .set_dst_pan_id(0xface)
        .set_dst_address(Address::Short(0x0400))
        .set_src_address(Address::Short(0x0401))
        .set_ack_request(true)
        .finalize()
        .unwrap();

    let mut buffer = vec![0u8; repr.buffer_len()];
    repr.emit(&mut Frame::new_unchecked(&mut buffer[..]));

    let frame = Frame::new(&buffer[..]).unwrap();
    log::debug!("data request: {:02x?}", buffer);
    assert_eq!(frame.command_id(), Some(CommandId::DataRequest));
    assert!(frame.frame_control().ack_request());
    assert_eq!(FrameRepr::parse(&frame).unwrap(), repr);
}

#[test]
fn frame_pending_is_written_in_place() {
    let repr = FrameBuilder::new_imm_ack(3).finalize().unwrap();
    let mut buffer = vec![0u8; repr.buffer_len()];
    let mut frame = Frame::new_unchecked(&mut buffer[..]);
    repr.emit(&mut frame);
    frame.set_frame_pending(true);
    assert_eq!(buffer, [0x12, 0x00, 0x03]);
}

#[test]
fn invalid_reprs() {
    let mut repr = FrameBuilder::new_data(&[1, 2, 3])
        .set_dst_pan_id(0xface)
        .set_dst_address(Address::BROADCAST)
        .set_src_address(Address::Short(1))
        .finalize()
        .unwrap();
    assert!(repr.validate().is_ok());

    repr.frame_control.security_enabled = true;
    assert!(repr.validate().is_err());
    repr.frame_control.security_enabled = false;

    repr.command_id = Some(CommandId::DataRequest);
    assert!(repr.validate().is_err());
    repr.command_id = None;

    let payload = [0u8; 120];
    repr.payload = &payload;
    assert!(repr.validate().is_err());
}
