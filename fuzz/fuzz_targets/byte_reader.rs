#![no_main]

use buffer::ByteBuffer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((ops, payload)) = data.split_first() else {
        return;
    };
    let mut buf = ByteBuffer::from_vec(payload.to_vec());

    // The first byte seeds a bounded sequence of reads over the rest.
    let mut op = *ops;
    for _ in 0..256 {
        let before = buf.processed();
        let failed = match op % 9 {
            0 => buf.read_u8().is_err(),
            1 => buf.read_u16().is_err(),
            2 => buf.read_u32().is_err(),
            3 => buf.read_u64().is_err(),
            4 => buf.read_bytes().is_err(),
            5 => buf.read_string().is_err(),
            6 => buf.read_array::<u32>().is_err(),
            7 => buf.read_str_array().is_err(),
            _ => buf.seek(usize::from(op) % (buf.len() + 1)).is_err(),
        };
        assert!(buf.processed() <= buf.len());
        if failed {
            assert_eq!(buf.processed(), before, "failed read moved the cursor");
        }
        op = op.wrapping_mul(31).wrapping_add(7);
    }
});
