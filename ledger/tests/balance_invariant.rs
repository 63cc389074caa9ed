//! Property: after any sequence of ledger operations, every account balance
//! equals the signed sum of its entries.

use std::sync::Arc;

use ofistur_common::{AgencyId, AuthContext, ClientId, OperatorId, Role, Subject, UserId};
use ofistur_ledger::{
    AdjustBalance, CreditEntry, EntryPatch, LedgerConfig, LedgerEngine, MemoryLedgerStore,
    PostEntry,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

const DOC_TYPES: [&str; 5] = ["investment", "receipt", "adjust_up", "adjust_down", "manual"];

#[derive(Debug, Clone)]
enum Op {
    Post { operator: bool, cents: i64, doc_type: usize },
    Reclassify { pick: usize, doc_type: usize },
    Delete { pick: usize },
    Adjust { pick: usize, cents: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<bool>(), 1i64..1_000_000, 0..DOC_TYPES.len())
            .prop_map(|(operator, cents, doc_type)| Op::Post { operator, cents, doc_type }),
        2 => (any::<usize>(), 0..DOC_TYPES.len())
            .prop_map(|(pick, doc_type)| Op::Reclassify { pick, doc_type }),
        1 => any::<usize>().prop_map(|pick| Op::Delete { pick }),
        1 => (any::<usize>(), -1_000_000i64..1_000_000)
            .prop_map(|(pick, cents)| Op::Adjust { pick, cents }),
    ]
}

fn subject(operator: bool) -> Subject {
    if operator {
        Subject::Operator(OperatorId(2))
    } else {
        Subject::Client(ClientId(1))
    }
}

async fn run(ops: Vec<Op>) -> Vec<(Decimal, Decimal)> {
    let store = Arc::new(MemoryLedgerStore::new());
    store.register_client(AgencyId(1), ClientId(1));
    store.register_operator(AgencyId(1), OperatorId(2));
    let engine = LedgerEngine::new(store, LedgerConfig::default());
    let auth = AuthContext::new(UserId(1), AgencyId(1), Role::Developer);

    let mut live: Vec<CreditEntry> = Vec::new();
    for op in ops {
        match op {
            Op::Post { operator, cents, doc_type } => {
                let request = PostEntry::for_subject(
                    subject(operator),
                    Decimal::new(cents, 2),
                    "ARS",
                    "prop",
                    Some(DOC_TYPES[doc_type]),
                );
                let posted = engine.post_entry(&auth, request).await.unwrap();
                live.push(posted.entry);
            }
            Op::Reclassify { pick, doc_type } if !live.is_empty() => {
                let index = pick % live.len();
                let patch = EntryPatch {
                    doc_type: Some(DOC_TYPES[doc_type].to_string()),
                    ..Default::default()
                };
                let updated = engine.update_entry(&auth, live[index].id, patch).await.unwrap();
                live[index] = updated.entry;
            }
            Op::Delete { pick } if !live.is_empty() => {
                let entry = live.swap_remove(pick % live.len());
                engine.delete_entry(&auth, entry.id, false).await.unwrap();
            }
            Op::Adjust { pick, cents } if !live.is_empty() => {
                let account_id = live[pick % live.len()].account_id;
                let target = Decimal::new(cents, 2).to_string();
                let outcome = engine
                    .adjust_balance(&auth, account_id, AdjustBalance::new(target.as_str(), "prop"))
                    .await
                    .unwrap();
                if let Some(entry) = outcome.entry {
                    live.push(entry);
                }
            }
            _ => {}
        }
    }

    let accounts = engine
        .list_accounts(&auth, &Default::default(), &Default::default())
        .await
        .unwrap();
    let mut pairs = Vec::new();
    for account in accounts.items {
        let report = engine.reconcile_account(&auth, account.id).await.unwrap();
        pairs.push((report.stored_balance, report.computed_balance));
    }
    pairs
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_balance_equals_signed_entry_sum(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let pairs = tokio_test::block_on(run(ops));
        for (stored, computed) in pairs {
            prop_assert_eq!(stored, computed);
        }
    }
}
