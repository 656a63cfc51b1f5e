//! Property tests for register word order.

use crane_common::registers::{WordOrder, decode_f32, encode_pair};
use proptest::prelude::*;

fn word_order() -> impl Strategy<Value = WordOrder> {
    prop_oneof![Just(WordOrder::HighFirst), Just(WordOrder::LowFirst)]
}

proptest! {
    #[test]
    fn pair_decodes_to_same_bits(bits in any::<u32>(), order in word_order()) {
        let value = f32::from_bits(bits);
        let regs = encode_pair(value, order);
        let decoded = decode_f32(&regs, 0, order).unwrap();
        prop_assert_eq!(decoded.to_bits(), bits);
    }

    #[test]
    fn orders_are_word_swaps(hi in any::<u16>(), lo in any::<u16>()) {
        let high_first = decode_f32(&[hi, lo], 0, WordOrder::HighFirst).unwrap();
        let low_first = decode_f32(&[lo, hi], 0, WordOrder::LowFirst).unwrap();
        prop_assert_eq!(high_first.to_bits(), low_first.to_bits());
    }

    #[test]
    fn short_slices_never_decode(len in 0usize..2, index in 0usize..4) {
        let regs = vec![0u16; len];
        prop_assert!(decode_f32(&regs, index, WordOrder::HighFirst).is_err());
    }
}
