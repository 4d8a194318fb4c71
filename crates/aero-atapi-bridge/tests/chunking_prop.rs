#![cfg(not(target_arch = "wasm32"))]

mod common;

use aero_atapi_bridge::scsi::READ_10;
use aero_atapi_bridge::{
    plan_chunk, BackendCompletion, DispatchOutcome, TransferLimit, TransferStep,
    BYTE_COUNT_SENTINEL,
};
use common::{bridge, drain, packet, pattern, set_limit};
use proptest::prelude::*;

const MAX_TOTAL: usize = 8 * 1024;

fn limit_strategy() -> impl Strategy<Value = u16> {
    prop_oneof![
        2u16..=64,
        Just(BYTE_COUNT_SENTINEL),
        Just(BYTE_COUNT_SENTINEL - 1),
        any::<u16>().prop_filter("non-zero progress", |l| *l >= 2),
    ]
}

proptest! {
    #[test]
    fn planned_chunk_respects_the_limit(remaining in 0usize..200_000, raw in any::<u16>()) {
        let limit = TransferLimit::from_raw(raw);
        prop_assert_ne!(limit.get(), BYTE_COUNT_SENTINEL);

        let plan = plan_chunk(remaining, limit);
        prop_assert_eq!(plan.chunk + plan.remaining, remaining);
        prop_assert!(plan.chunk <= usize::from(limit.get()));
        if remaining > usize::from(limit.get()) {
            prop_assert_eq!(plan.chunk, usize::from(limit.get() & !1));
        } else {
            prop_assert_eq!(plan.chunk, remaining);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn programmed_chunks_tile_the_response(total in 1usize..=MAX_TOTAL, raw in limit_strategy()) {
        let mut b = bridge();
        set_limit(&mut b, raw);
        let id = b.on_command_received(&packet(READ_10), 0).unwrap();
        let first = match b.on_completion(id, BackendCompletion::good(pattern(total))) {
            DispatchOutcome::Programmed { first_chunk, total: t } => {
                prop_assert_eq!(t, total);
                first_chunk
            }
            other => return Err(TestCaseError::fail(format!("unexpected outcome {other:?}"))),
        };

        let mut next = first;
        loop {
            match b.on_chunk_acknowledged() {
                TransferStep::Chunk { offset, len } => {
                    prop_assert_eq!(offset, next);
                    prop_assert!(len > 0);
                    next += len;
                }
                TransferStep::Done => break,
                other => return Err(TestCaseError::fail(format!("unexpected step {other:?}"))),
            }
        }
        prop_assert_eq!(next, total);
        prop_assert!(b.is_idle());
        prop_assert_eq!(b.backend().completed.len(), 1);
    }

    #[test]
    fn host_reads_back_exactly_the_payload(total in 1usize..=2048, raw in 2u16..=512) {
        let mut b = bridge();
        set_limit(&mut b, raw);
        let id = b.on_command_received(&packet(READ_10), 0).unwrap();
        let payload = pattern(total);
        b.on_completion(id, BackendCompletion::good(payload.clone()));

        prop_assert_eq!(drain(&mut b, total), payload);
        prop_assert!(b.is_idle());
    }
}
