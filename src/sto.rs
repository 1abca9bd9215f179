// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Proportional distribution shared by Send-To-Owners (`spec.md` §4.7 type
//! 3) and fee-cache distribution (`spec.md` §4.10): split `total_amount`
//! across `holders` proportional to their holding, using floor division so
//! the sum of shares never exceeds `total_amount`; the undistributed
//! residue stays with the distributor.

use crate::error::SemanticError;
use crate::types::{Address, Amount};

/// One distribution line: the recipient and the floor-divided share they
/// receive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub recipient: Address,
    pub amount: Amount,
}

/// Computes the proportional split of `total_amount` across `holders`
/// (`address`, `holding`) pairs, plus the residue that rounding leaves
/// undistributed (`spec.md` §3.2 "Send To Owners", §4.7, §4.10).
pub fn compute(total_amount: Amount, holders: &[(Address, Amount)]) -> Result<(Vec<Distribution>, Amount), SemanticError> {
    let total_holding: i128 = holders.iter().map(|(_, h)| *h as i128).sum();
    if total_holding == 0 || holders.is_empty() {
        return Err(SemanticError::NoEligibleHolders);
    }

    let mut distributed: i128 = 0;
    let mut out = Vec::with_capacity(holders.len());
    for (addr, holding) in holders {
        let share = (total_amount as i128 * *holding as i128) / total_holding;
        distributed += share;
        if share > 0 {
            out.push(Distribution { recipient: addr.clone(), amount: share as Amount });
        }
    }
    let residue = (total_amount as i128 - distributed) as Amount;
    Ok((out, residue))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_proportionally_and_keeps_residue() {
        let holders = vec![(Address::new("a"), 100), (Address::new("b"), 200), (Address::new("c"), 1)];
        let (dist, residue) = compute(301, &holders).unwrap();
        let total: Amount = dist.iter().map(|d| d.amount).sum::<Amount>() + residue;
        assert_eq!(total, 301);
        assert_eq!(dist[0].amount, 100);
        assert_eq!(dist[1].amount, 200);
    }

    #[test]
    fn errors_when_no_holders() {
        assert!(compute(100, &[]).is_err());
    }
}
