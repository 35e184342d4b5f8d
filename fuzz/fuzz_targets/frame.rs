#![no_main]

use thread15d4_frame::{Frame, FrameRepr, FrameWithFcs, MAX_PHY_PACKET_SIZE};

use libfuzzer_sys::{fuzz_target, Corpus};

fuzz_target!(|data: &[u8]| -> Corpus {
    if data.len() > MAX_PHY_PACKET_SIZE {
        return Corpus::Reject;
    }

    if let Ok(frame) = FrameWithFcs::new(data) {
        let _ = frame.frame();
    }

    if let Ok(frame) = Frame::new(data) {
        let _ = frame.command_id();
        let _ = frame.payload();
        let _ = frame.mic();
        if let Ok(repr) = FrameRepr::parse(&frame) {
            let _ = repr.buffer_len();
        }
    }

    Corpus::Keep
});
