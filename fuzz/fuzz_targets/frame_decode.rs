#![no_main]

use buffer::ByteBuffer;
use codec::{decode_frame, CodecLimits, Dispatcher, Registry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let dispatcher = Dispatcher::new(Registry::with_builtin())
        .with_limits(CodecLimits::for_testing())
        .with_wire_limits(wire::Limits::for_testing());

    // Walk the input as a stream of frames.
    let mut rest = data;
    while let Ok(Some((_, used))) = decode_frame(&dispatcher, rest) {
        rest = &rest[used..];
    }

    // Also feed the raw bytes straight to the envelope decoder.
    let mut buf = ByteBuffer::from_vec(data.to_vec());
    if dispatcher.dispatch_unpack(&mut buf).is_err() {
        assert_eq!(buf.processed(), 0);
    }
    let mut buf = ByteBuffer::from_vec(data.to_vec());
    let _ = wire::take_deferred_type(&mut buf);
});
