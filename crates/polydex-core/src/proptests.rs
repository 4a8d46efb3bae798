//! Property-based tests for the identity codec and key packing.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use crate::util::ids::{GlobalDocumentId, partition_id};
    use crate::util::packing::packed_key;

    proptest! {
        #[test]
        fn decode_inverts_encode(partition in any::<u32>(), local in any::<u32>()) {
            let id = GlobalDocumentId::encode(partition, local);
            prop_assert_eq!(id.decode(), (partition, local));
        }

        #[test]
        fn encode_is_injective(
            a in (any::<u32>(), any::<u32>()),
            b in (any::<u32>(), any::<u32>()),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(
                GlobalDocumentId::encode(a.0, a.1),
                GlobalDocumentId::encode(b.0, b.1)
            );
        }

        #[test]
        fn raw_round_trip(raw in any::<u64>()) {
            let id = GlobalDocumentId::from_raw(raw);
            let (partition, local) = id.decode();
            prop_assert_eq!(GlobalDocumentId::encode(partition, local).as_u64(), raw);
        }

        #[test]
        fn partition_id_is_deterministic(name in "[A-Za-z_][A-Za-z0-9_]{0,30}") {
            prop_assert_eq!(partition_id(&name), partition_id(&name.clone()));
        }

        #[test]
        fn packed_order_never_contradicts_string_order(a in "[ -~]{0,8}", b in "[ -~]{0,8}") {
            if a < b {
                prop_assert!(packed_key(&a) <= packed_key(&b));
            }
        }
    }
}
