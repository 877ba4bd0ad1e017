//! Version-aware package admission policy.
//!
//! Version-3 ("TRUC") transactions are topologically restricted until
//! confirmation: packages of at most one unconfirmed parent and one
//! unconfirmed child, tight size bounds, and sibling eviction by feerate.
//! Everything here is a pure function over a consistent wallet snapshot;
//! evaluation has no side effects and is safe from any number of readers.

use std::collections::BTreeSet;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use super::wallet::error::FundingError;
use super::wallet::error::PolicyError;
use super::wallet::transaction_record::TransactionRecord;
use super::wallet::wallet_state::WalletState;
use crate::models::blockchain::amount::Amount;
use crate::models::blockchain::transaction::Outpoint;
use crate::models::blockchain::transaction::Transaction;
use crate::models::blockchain::transaction::TransactionId;
use crate::models::blockchain::transaction::TxVersion;

/// Maximum virtual size of a version-3 transaction, in vbytes.
pub const TRUC_MAX_VSIZE: u64 = 10_000;

/// Maximum combined virtual size of a version-3 parent/child package.
pub const TRUC_CHILD_MAX_VSIZE: u64 = 1_000;

/// Virtual size one attached funding input adds to a transaction.
pub const FUNDING_INPUT_VSIZE: u64 = 68;

/// Virtual size of the change output funding normally appends.
pub const CHANGE_OUTPUT_VSIZE: u64 = 43;

/// Positive admission result: the candidate may be submitted once the
/// listed mempool transactions are evicted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionVerdict {
    pub evictions: Vec<TransactionId>,
}

/// Caller knobs for funding-input selection.
#[derive(Clone, Copy, Debug, Default)]
pub struct FundingOptions {
    /// Allow spending unconfirmed coins the wallet cannot vouch for.
    pub include_unsafe: bool,

    /// Caller-supplied weight ceiling. Never loosened, never silently
    /// overwritten by the version-3 maximum.
    pub max_weight: Option<u64>,
}

/// Whether a candidate paying `fee` at `vsize` outbids an existing mempool
/// resident. Cross-multiplied to avoid rationals; a resident with unknown
/// fee is always outbid.
pub(crate) fn feerate_exceeds(fee: Amount, vsize: u64, existing: &TransactionRecord) -> bool {
    let Some(existing_fee) = existing.fee else {
        return true;
    };
    let candidate = fee.to_base_units() as u128 * existing.transaction.vsize as u128;
    let resident = existing_fee.to_base_units() as u128 * vsize as u128;
    candidate > resident
}

/// Validate a candidate transaction against the version-topology rules and
/// compute the evictions its admission requires.
pub fn validate_for_admission(
    wallet: &WalletState,
    candidate: &Transaction,
    fee: Amount,
) -> Result<AdmissionVerdict, PolicyError> {
    let configuration = wallet.configuration();

    if candidate.version.is_truc() && candidate.vsize > configuration.truc_max_vsize {
        return Err(PolicyError::WeightExceeded {
            vsize: candidate.vsize,
            limit: configuration.truc_max_vsize,
        });
    }

    let mut evictions: BTreeSet<TransactionId> = BTreeSet::new();
    let mut unconfirmed_parents: BTreeSet<TransactionId> = BTreeSet::new();

    for input in &candidate.inputs {
        if let Some(parent) = wallet.record(input.txid) {
            if parent.confirmed_in_block.is_none() && parent.in_mempool {
                // confirmed outputs carry no version restriction; unconfirmed
                // ones must be spent by a same-version transaction
                if parent.version() != candidate.version {
                    return Err(PolicyError::VersionMismatch {
                        input_version: parent.version(),
                        tx_version: candidate.version,
                    });
                }
                unconfirmed_parents.insert(input.txid);
            }
        }

        // spending an already-spent outpoint is a replacement; it must
        // outbid every mempool resident it displaces
        for spender in wallet.spenders_of(input).collect_vec() {
            if spender == candidate.txid {
                continue;
            }
            let Some(existing) = wallet.record(spender) else {
                continue;
            };
            if existing.in_mempool && existing.confirmed_in_block.is_none() {
                if feerate_exceeds(fee, candidate.vsize, existing) {
                    evictions.insert(spender);
                } else {
                    return Err(PolicyError::ReplacementFeeTooLow { existing: spender });
                }
            }
        }
    }

    if candidate.version.is_truc() {
        if unconfirmed_parents.len() > 1 {
            return Err(PolicyError::TooManyUnconfirmedAncestors);
        }

        if let Some(parent_id) = unconfirmed_parents.first().copied() {
            let parent = wallet
                .record(parent_id)
                .expect("unconfirmed parent was just resolved");

            // the parent must be a package root; a grandparent would make
            // the candidate's unconfirmed ancestry two deep
            let parent_has_unconfirmed_parent = parent.transaction.inputs.iter().any(|input| {
                wallet
                    .record(input.txid)
                    .is_some_and(|r| r.in_mempool && r.confirmed_in_block.is_none())
            });
            if parent_has_unconfirmed_parent {
                return Err(PolicyError::TooManyUnconfirmedAncestors);
            }

            let combined = parent.transaction.vsize + candidate.vsize;
            if combined > configuration.truc_child_max_vsize {
                return Err(PolicyError::WeightExceeded {
                    vsize: combined,
                    limit: configuration.truc_child_max_vsize,
                });
            }

            // one descendant only: a second child must evict the first
            for sibling in wallet.mempool_children(parent_id) {
                if sibling == candidate.txid || evictions.contains(&sibling) {
                    continue;
                }
                let Some(existing) = wallet.record(sibling) else {
                    continue;
                };
                if feerate_exceeds(fee, candidate.vsize, existing) {
                    evictions.insert(sibling);
                } else {
                    return Err(PolicyError::SiblingFeeTooLow { existing: sibling });
                }
            }
        }
    }

    Ok(AdmissionVerdict {
        evictions: evictions.into_iter().collect(),
    })
}

/// Choose wallet coins funding a transaction of `target_version` with value
/// at least `target_amount`, within the version's weight envelope.
pub fn select_funding_inputs(
    wallet: &WalletState,
    target_version: TxVersion,
    target_amount: Amount,
    base_vsize: u64,
    options: &FundingOptions,
) -> Result<Vec<Outpoint>, FundingError> {
    let configuration = wallet.configuration();

    if let Some(max) = options.max_weight {
        if max < base_vsize {
            return Err(PolicyError::MaxWeightBelowBase {
                max,
                base: base_vsize,
            }
            .into());
        }
    }

    let version_limit = target_version
        .is_truc()
        .then_some(configuration.truc_max_vsize);
    let weight_limit = match (version_limit, options.max_weight) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    };

    let candidates = wallet.funding_candidates(target_version, options.include_unsafe);

    let available: Amount = candidates
        .confirmed
        .iter()
        .map(|(_, value)| *value)
        .chain(
            candidates
                .unconfirmed_by_parent
                .values()
                .flat_map(|parent| parent.coins.iter().map(|(_, value)| *value)),
        )
        .sum();

    let mut selected: Vec<Outpoint> = vec![];
    let mut total = Amount::from(0);
    let mut used_parent_vsize: Option<u64> = None;

    // confirmed coins first, largest first for the smallest input count
    let confirmed = candidates
        .confirmed
        .iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (outpoint, value) in confirmed {
        if total >= target_amount {
            break;
        }
        selected.push(*outpoint);
        total += *value;
    }

    if total < target_amount {
        // unconfirmed parents, richest first. A version-3 target may draw
        // from one parent only; version-2 ancestry is unbounded.
        let parents = candidates
            .unconfirmed_by_parent
            .iter()
            .sorted_by_key(|(id, parent)| {
                let sum: Amount = parent.coins.iter().map(|(_, value)| *value).sum();
                (std::cmp::Reverse(sum), **id)
            });
        'parents: for (_, parent) in parents {
            used_parent_vsize.get_or_insert(parent.parent_vsize);
            let coins = parent
                .coins
                .iter()
                .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (outpoint, value) in coins {
                if total >= target_amount {
                    break 'parents;
                }
                selected.push(*outpoint);
                total += *value;
            }
            if target_version.is_truc() {
                break;
            }
        }
    }

    if total < target_amount {
        return Err(FundingError::InsufficientFunds {
            requested: target_amount,
            available,
        });
    }

    let funded_vsize = base_vsize + selected.len() as u64 * FUNDING_INPUT_VSIZE;
    if let Some(limit) = weight_limit {
        if funded_vsize > limit {
            return Err(FundingError::WeightExceeded);
        }
        if funded_vsize + CHANGE_OUTPUT_VSIZE > limit {
            info!("funding selection leaves no room for a change output");
        }
    }
    if target_version.is_truc() {
        if let Some(parent_vsize) = used_parent_vsize {
            if parent_vsize + funded_vsize > configuration.truc_child_max_vsize {
                return Err(FundingError::WeightExceeded);
            }
        }
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::wallet::transaction_record::TxState;
    use crate::tests::shared::add_to_mempool;
    use crate::tests::shared::foreign_outpoint;
    use crate::tests::shared::fund_confirmed_versioned;
    use crate::tests::shared::fund_unconfirmed_versioned;
    use crate::tests::shared::lock;
    use crate::tests::shared::make_tx;
    use crate::tests::shared::make_tx_with_vsize;
    use crate::tests::shared::wallet_owning;

    const FOREIGN_LOCK: u8 = 0x99;

    #[test]
    fn truc_weight_boundary_is_exact() {
        let wallet = wallet_owning(&[1]);

        let at_limit = make_tx_with_vsize(
            20,
            TxVersion::Truc,
            vec![foreign_outpoint(20)],
            vec![(10, lock(FOREIGN_LOCK))],
            TRUC_MAX_VSIZE,
        );
        assert!(wallet
            .validate_for_admission(&at_limit, Amount::from(10))
            .is_ok());

        let over_limit = make_tx_with_vsize(
            21,
            TxVersion::Truc,
            vec![foreign_outpoint(21)],
            vec![(10, lock(FOREIGN_LOCK))],
            TRUC_MAX_VSIZE + 1,
        );
        assert_eq!(
            Err(PolicyError::WeightExceeded {
                vsize: TRUC_MAX_VSIZE + 1,
                limit: TRUC_MAX_VSIZE
            }),
            wallet.validate_for_admission(&over_limit, Amount::from(10))
        );

        // no such bound for a version-2 transaction
        let standard = make_tx_with_vsize(
            22,
            TxVersion::Standard,
            vec![foreign_outpoint(22)],
            vec![(10, lock(FOREIGN_LOCK))],
            TRUC_MAX_VSIZE + 1,
        );
        assert!(wallet
            .validate_for_admission(&standard, Amount::from(10))
            .is_ok());
    }

    #[test]
    fn unconfirmed_outputs_must_be_spent_by_matching_version() {
        for (parent_version, child_version) in [
            (TxVersion::Truc, TxVersion::Standard),
            (TxVersion::Standard, TxVersion::Truc),
        ] {
            let mut wallet = wallet_owning(&[1]);
            let (_, coin) =
                fund_unconfirmed_versioned(&mut wallet, 20, 100, 1, parent_version);

            let spend = make_tx(21, child_version, vec![coin], vec![(99, lock(1))]);
            assert_eq!(
                Err(PolicyError::VersionMismatch {
                    input_version: parent_version,
                    tx_version: child_version,
                }),
                wallet.validate_for_admission(&spend, Amount::from(1))
            );

            let message = wallet
                .validate_for_admission(&spend, Amount::from(1))
                .unwrap_err()
                .to_string();
            assert_eq!(
                format!(
                    "can't spend unconfirmed version {} pre-selected input with a version {} transaction",
                    parent_version.as_u32(),
                    child_version.as_u32()
                ),
                message
            );
        }
    }

    #[test]
    fn confirmed_outputs_carry_no_version_restriction() {
        let mut wallet = wallet_owning(&[1]);
        let coin = fund_confirmed_versioned(&mut wallet, 20, 100, 1, TxVersion::Truc);

        let spend = make_tx(21, TxVersion::Standard, vec![coin], vec![(99, lock(1))]);
        assert!(wallet
            .validate_for_admission(&spend, Amount::from(1))
            .is_ok());
    }

    #[test]
    fn truc_package_is_limited_to_one_unconfirmed_ancestor() {
        let mut wallet = wallet_owning(&[1]);
        let (_, coin_a) = fund_unconfirmed_versioned(&mut wallet, 20, 100, 1, TxVersion::Truc);
        let (_, coin_b) = fund_unconfirmed_versioned(&mut wallet, 21, 100, 1, TxVersion::Truc);

        let two_parents = make_tx(
            22,
            TxVersion::Truc,
            vec![coin_a, coin_b],
            vec![(199, lock(1))],
        );
        assert_eq!(
            Err(PolicyError::TooManyUnconfirmedAncestors),
            wallet.validate_for_admission(&two_parents, Amount::from(1))
        );

        // a grandparent also exceeds the package depth
        let child = make_tx(23, TxVersion::Truc, vec![coin_a], vec![(99, lock(1))]);
        add_to_mempool(&mut wallet, &child, 1);
        let grandchild = make_tx(
            24,
            TxVersion::Truc,
            vec![Outpoint::new(child.txid, 0)],
            vec![(98, lock(1))],
        );
        assert_eq!(
            Err(PolicyError::TooManyUnconfirmedAncestors),
            wallet.validate_for_admission(&grandchild, Amount::from(1))
        );
    }

    #[test]
    fn truc_child_weight_bound_covers_the_package() {
        let mut wallet = wallet_owning(&[1]);
        let parent = make_tx_with_vsize(
            20,
            TxVersion::Truc,
            vec![foreign_outpoint(20)],
            vec![(100, lock(1))],
            800,
        );
        add_to_mempool(&mut wallet, &parent, 10);

        let heavy_child = make_tx_with_vsize(
            21,
            TxVersion::Truc,
            vec![Outpoint::new(parent.txid, 0)],
            vec![(99, lock(1))],
            300,
        );
        assert_eq!(
            Err(PolicyError::WeightExceeded {
                vsize: 1100,
                limit: TRUC_CHILD_MAX_VSIZE
            }),
            wallet.validate_for_admission(&heavy_child, Amount::from(1))
        );

        let light_child = make_tx_with_vsize(
            22,
            TxVersion::Truc,
            vec![Outpoint::new(parent.txid, 0)],
            vec![(99, lock(1))],
            150,
        );
        assert!(wallet
            .validate_for_admission(&light_child, Amount::from(1))
            .is_ok());
    }

    #[test]
    fn second_sibling_must_outbid_the_first() {
        let mut wallet = wallet_owning(&[1, 2]);
        let parent = make_tx(
            20,
            TxVersion::Truc,
            vec![foreign_outpoint(20)],
            vec![(100, lock(1)), (100, lock(2))],
        );
        add_to_mempool(&mut wallet, &parent, 10);

        let first_child = make_tx(
            21,
            TxVersion::Truc,
            vec![Outpoint::new(parent.txid, 0)],
            vec![(99, lock(1))],
        );
        add_to_mempool(&mut wallet, &first_child, 2);

        let cheap_sibling = make_tx(
            22,
            TxVersion::Truc,
            vec![Outpoint::new(parent.txid, 1)],
            vec![(99, lock(2))],
        );
        assert_eq!(
            Err(PolicyError::SiblingFeeTooLow {
                existing: first_child.txid
            }),
            wallet.validate_for_admission(&cheap_sibling, Amount::from(1))
        );

        let rich_sibling = make_tx(
            23,
            TxVersion::Truc,
            vec![Outpoint::new(parent.txid, 1)],
            vec![(95, lock(2))],
        );
        let verdict = wallet
            .validate_for_admission(&rich_sibling, Amount::from(5))
            .unwrap();
        assert_eq!(vec![first_child.txid], verdict.evictions);
    }

    #[test]
    fn replacement_must_outbid_every_displaced_resident() {
        let mut wallet = wallet_owning(&[1]);
        let (original, _) = fund_unconfirmed_versioned(&mut wallet, 20, 100, 1, TxVersion::Standard);

        let cheap = make_tx(
            21,
            TxVersion::Standard,
            vec![original.inputs[0]],
            vec![(99, lock(FOREIGN_LOCK))],
        );
        assert_eq!(
            Err(PolicyError::ReplacementFeeTooLow {
                existing: original.txid
            }),
            wallet.validate_for_admission(&cheap, Amount::from(1))
        );

        let rich = make_tx(
            22,
            TxVersion::Standard,
            vec![original.inputs[0]],
            vec![(80, lock(FOREIGN_LOCK))],
        );
        let verdict = wallet
            .validate_for_admission(&rich, Amount::from(20))
            .unwrap();
        assert_eq!(vec![original.txid], verdict.evictions);
    }

    #[test]
    fn funding_prefers_confirmed_and_filters_by_version() {
        let mut wallet = wallet_owning(&[1]);
        let confirmed_v2 = fund_confirmed_versioned(&mut wallet, 20, 100, 1, TxVersion::Standard);
        let confirmed_v3 = fund_confirmed_versioned(&mut wallet, 21, 100, 1, TxVersion::Truc);
        let (_, unconfirmed_v2) =
            fund_unconfirmed_versioned(&mut wallet, 22, 100, 1, TxVersion::Standard);
        let (_, unconfirmed_v3) =
            fund_unconfirmed_versioned(&mut wallet, 23, 100, 1, TxVersion::Truc);

        let options = FundingOptions {
            include_unsafe: true,
            ..Default::default()
        };

        // a v3 sweep may draw on both confirmed coins and the unconfirmed
        // v3 coin, never the unconfirmed v2 coin
        let selected = wallet
            .select_funding_inputs(TxVersion::Truc, Amount::from(300), 150, &options)
            .unwrap();
        assert!(selected.contains(&confirmed_v2));
        assert!(selected.contains(&confirmed_v3));
        assert!(selected.contains(&unconfirmed_v3));
        assert!(!selected.contains(&unconfirmed_v2));

        // and symmetrically for a v2 sweep
        let selected = wallet
            .select_funding_inputs(TxVersion::Standard, Amount::from(300), 150, &options)
            .unwrap();
        assert!(selected.contains(&unconfirmed_v2));
        assert!(!selected.contains(&unconfirmed_v3));
    }

    #[test]
    fn funding_skips_untrusted_coins_unless_unsafe_allowed() {
        let mut wallet = wallet_owning(&[1]);
        fund_unconfirmed_versioned(&mut wallet, 20, 100, 1, TxVersion::Standard);

        let safe_only = wallet.select_funding_inputs(
            TxVersion::Standard,
            Amount::from(50),
            150,
            &FundingOptions::default(),
        );
        assert_eq!(
            Err(FundingError::InsufficientFunds {
                requested: Amount::from(50),
                available: Amount::from(0)
            }),
            safe_only
        );

        let with_unsafe = wallet.select_funding_inputs(
            TxVersion::Standard,
            Amount::from(50),
            150,
            &FundingOptions {
                include_unsafe: true,
                ..Default::default()
            },
        );
        assert_eq!(1, with_unsafe.unwrap().len());
    }

    #[test]
    fn funding_skips_truc_parents_with_taken_descendant_slot() {
        let mut wallet = wallet_owning(&[1, 2]);
        let parent = make_tx(
            20,
            TxVersion::Truc,
            vec![foreign_outpoint(20)],
            vec![(200, lock(1)), (200, lock(2))],
        );
        add_to_mempool(&mut wallet, &parent, 10);

        // another wallet's child occupies the package slot
        let child = make_tx(
            21,
            TxVersion::Truc,
            vec![Outpoint::new(parent.txid, 0)],
            vec![(199, lock(FOREIGN_LOCK))],
        );
        add_to_mempool(&mut wallet, &child, 2);
        assert_eq!(TxState::InMempool, wallet.tx_state(child.txid).unwrap());

        let result = wallet.select_funding_inputs(
            TxVersion::Truc,
            Amount::from(100),
            150,
            &FundingOptions {
                include_unsafe: true,
                ..Default::default()
            },
        );
        assert_eq!(
            Err(FundingError::InsufficientFunds {
                requested: Amount::from(100),
                available: Amount::from(0)
            }),
            result
        );
    }

    #[test]
    fn funding_weight_envelope() {
        let mut wallet = wallet_owning(&[1]);
        fund_confirmed_versioned(&mut wallet, 20, 1000, 1, TxVersion::Standard);

        // base size alone busts the version-3 envelope
        let result = wallet.select_funding_inputs(
            TxVersion::Truc,
            Amount::from(100),
            TRUC_MAX_VSIZE + 50,
            &FundingOptions::default(),
        );
        assert_eq!(Err(FundingError::WeightExceeded), result);

        // fits once inputs are accounted for
        let result = wallet.select_funding_inputs(
            TxVersion::Truc,
            Amount::from(100),
            TRUC_MAX_VSIZE - 100,
            &FundingOptions::default(),
        );
        assert!(result.is_ok());

        // a version-2 transaction has no version envelope
        let result = wallet.select_funding_inputs(
            TxVersion::Standard,
            Amount::from(100),
            TRUC_MAX_VSIZE + 50,
            &FundingOptions::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn funding_respects_package_weight_with_unconfirmed_parent() {
        let mut wallet = wallet_owning(&[1]);
        let parent = make_tx_with_vsize(
            20,
            TxVersion::Truc,
            vec![foreign_outpoint(20)],
            vec![(500, lock(1))],
            800,
        );
        add_to_mempool(&mut wallet, &parent, 10);

        let options = FundingOptions {
            include_unsafe: true,
            ..Default::default()
        };

        // 800 (parent) + 200 (base) + 68 (input) busts the package bound
        let result =
            wallet.select_funding_inputs(TxVersion::Truc, Amount::from(100), 200, &options);
        assert_eq!(Err(FundingError::WeightExceeded), result);

        // a slim child fits: 800 + 100 + 68 < 1000
        let result =
            wallet.select_funding_inputs(TxVersion::Truc, Amount::from(100), 100, &options);
        assert!(result.is_ok());
    }

    #[test]
    fn user_weight_ceiling_is_not_overwritten() {
        let mut wallet = wallet_owning(&[1]);
        fund_confirmed_versioned(&mut wallet, 20, 1000, 1, TxVersion::Standard);

        let result = wallet.select_funding_inputs(
            TxVersion::Truc,
            Amount::from(100),
            TRUC_MAX_VSIZE / 2,
            &FundingOptions {
                include_unsafe: true,
                max_weight: Some(TRUC_MAX_VSIZE / 2 - 1),
            },
        );
        assert_eq!(
            Err(FundingError::Policy(PolicyError::MaxWeightBelowBase {
                max: TRUC_MAX_VSIZE / 2 - 1,
                base: TRUC_MAX_VSIZE / 2,
            })),
            result
        );
    }
}
