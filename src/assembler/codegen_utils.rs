/// Split a 32-bit value into its four little-endian bytes, as a `Vec<u8>`
/// ready to append to a codegen buffer.
#[macro_export]
macro_rules! split_u32_le {
    ($val:expr) => {{
        let val: u32 = $val;
        val.to_le_bytes().to_vec()
    }};
}
