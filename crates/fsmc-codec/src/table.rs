use crate::arith::MAX_TOTAL;
use crate::huffman::PrefixCode;
use crate::model::{SymbolId, SymbolModel};
use crate::scorer::{Ranking, SCORE_ONE};
use fsmc_core::{CodecError, Result};
use fsmc_integrity::{block_checksum, fingerprint, BLOCK_CHECKSUM_LEN};

/// Prefix-set size used when none is configured: `min(A, max(16, A/4))`.
pub fn default_top_k(alphabet_len: usize) -> usize {
    alphabet_len.min((alphabet_len / 4).max(16))
}

/// A leaf of the prefix code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf {
    Symbol(SymbolId),
    /// Hands the symbol to the arithmetic coder.
    Residual,
    /// Followed by the raw symbol encoding.
    Escape,
}

/// Where a known symbol lives under the active table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Prefix(usize),
    Residual(usize),
}

/// Digest of the ranked prefix set and leaf layout.
///
/// Equal fingerprints at a check point keep the live table. The fingerprint
/// says nothing about code lengths, which follow from scores; those are
/// pinned separately by [`CodeTable::code_digest`].
pub fn ranking_fingerprint(ranked: &[SymbolId], has_residual: bool, has_escape: bool) -> u64 {
    let mut bytes = Vec::with_capacity(10 + ranked.len() * 4);
    bytes.extend_from_slice(&(ranked.len() as u64).to_le_bytes());
    for id in ranked {
        bytes.extend_from_slice(&id.to_le_bytes());
    }
    bytes.push(has_residual as u8);
    bytes.push(has_escape as u8);
    fingerprint(&bytes)
}

/// The code in force for one epoch.
///
/// ## Layout
/// Prefix leaves in rank order, then `Residual` (if any symbol is not
/// ranked, or escape may grow the alphabet), then `Escape` (if enabled).
/// The residual set is ranked leftovers in rank order followed by unranked
/// alphabet members by ascending id; symbols admitted mid-epoch are appended.
#[derive(Debug, Clone)]
pub struct CodeTable {
    epoch: u64,
    ranked: Vec<SymbolId>,
    leaves: Vec<Leaf>,
    code: PrefixCode,
    residual: Vec<SymbolId>,
    /// Indexed by symbol id.
    assignment: Vec<Assignment>,
    residual_leaf: Option<usize>,
    escape_leaf: Option<usize>,
    fingerprint: u64,
    code_digest: [u8; BLOCK_CHECKSUM_LEN],
}

impl CodeTable {
    /// Number of prefix-coded symbols for a ranking over `alphabet_len`.
    pub fn prefix_size(ranking: &Ranking, alphabet_len: usize, top_k: Option<usize>) -> usize {
        top_k
            .unwrap_or_else(|| default_top_k(alphabet_len))
            .min(ranking.len())
    }

    /// Fingerprint of the table [`CodeTable::build`] would produce, without
    /// building it.
    pub fn fingerprint_for(
        ranking: &Ranking,
        alphabet_len: usize,
        top_k: Option<usize>,
        escape: bool,
    ) -> u64 {
        let k = Self::prefix_size(ranking, alphabet_len, top_k);
        let ranked: Vec<SymbolId> = ranking.top(k).iter().map(|entry| entry.id).collect();
        ranking_fingerprint(&ranked, alphabet_len > k || escape, escape)
    }

    pub fn build(
        model: &SymbolModel,
        ranking: &Ranking,
        top_k: Option<usize>,
        escape: bool,
        epoch: u64,
    ) -> Self {
        let alphabet_len = model.alphabet_len();
        let k = Self::prefix_size(ranking, alphabet_len, top_k);

        let mut slots: Vec<Option<Assignment>> = vec![None; alphabet_len];
        let mut leaves = Vec::with_capacity(k + 2);
        let mut weights = Vec::with_capacity(k + 2);
        let mut ranked = Vec::with_capacity(k);

        for (leaf, entry) in ranking.top(k).iter().enumerate() {
            ranked.push(entry.id);
            leaves.push(Leaf::Symbol(entry.id));
            weights.push(1 + entry.score);
            slots[entry.id as usize] = Some(Assignment::Prefix(leaf));
        }

        let mut residual = Vec::with_capacity(alphabet_len.saturating_sub(k));
        let mut residual_weight = 1u64;
        for entry in &ranking.entries()[k..] {
            slots[entry.id as usize] = Some(Assignment::Residual(residual.len()));
            residual.push(entry.id);
            residual_weight = residual_weight.saturating_add(entry.score);
        }
        for id in 0..alphabet_len {
            if slots[id].is_none() {
                slots[id] = Some(Assignment::Residual(residual.len()));
                residual.push(id as SymbolId);
                residual_weight = residual_weight.saturating_add(SCORE_ONE);
            }
        }

        let residual_leaf = if !residual.is_empty() || escape {
            leaves.push(Leaf::Residual);
            weights.push(residual_weight);
            Some(leaves.len() - 1)
        } else {
            None
        };
        let escape_leaf = if escape {
            leaves.push(Leaf::Escape);
            weights.push((1 + model.novel_in_window() as u64) * SCORE_ONE);
            Some(leaves.len() - 1)
        } else {
            None
        };

        let fingerprint = ranking_fingerprint(&ranked, residual_leaf.is_some(), escape);
        let assignment = slots.into_iter().flatten().collect();
        let code = PrefixCode::from_weights(&weights);
        let lengths: Vec<u8> = code.lengths().map(|len| len as u8).collect();
        let code_digest = block_checksum(&[&lengths]);

        Self {
            epoch,
            ranked,
            leaves,
            code,
            residual,
            assignment,
            residual_leaf,
            escape_leaf,
            fingerprint,
            code_digest,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn ranked(&self) -> &[SymbolId] {
        &self.ranked
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Digest of the code lengths, carried in every snapshot.
    pub fn code_digest(&self) -> [u8; BLOCK_CHECKSUM_LEN] {
        self.code_digest
    }

    pub fn code(&self) -> &PrefixCode {
        &self.code
    }

    pub fn leaf(&self, index: usize) -> Option<Leaf> {
        self.leaves.get(index).copied()
    }

    pub fn residual_leaf(&self) -> Option<usize> {
        self.residual_leaf
    }

    pub fn escape_leaf(&self) -> Option<usize> {
        self.escape_leaf
    }

    pub fn residual(&self) -> &[SymbolId] {
        &self.residual
    }

    pub fn residual_id(&self, index: usize) -> Option<SymbolId> {
        self.residual.get(index).copied()
    }

    pub fn assignment(&self, id: SymbolId) -> Option<Assignment> {
        self.assignment.get(id as usize).copied()
    }

    /// Appends a symbol admitted through the escape path to the residual set.
    pub fn admit(&mut self, id: SymbolId) {
        debug_assert_eq!(id as usize, self.assignment.len());
        self.assignment.push(Assignment::Residual(self.residual.len()));
        self.residual.push(id);
    }
}

/// Residual frequencies for one coding step.
///
/// `freq(r) = 1 + count(ctx, r)` and the cumulative frequency of residual
/// index `i` is `i + sum(counts of successors with a lower index)`. Only the
/// observed successors are materialized; every other member contributes the
/// implicit `+1`.
#[derive(Debug, Clone)]
pub struct ResidualFrequencies {
    /// `(residual index, count)` sorted by index.
    observed: Vec<(usize, u64)>,
    members: u64,
    total: u64,
}

impl ResidualFrequencies {
    pub fn gather(table: &CodeTable, model: &SymbolModel) -> Result<Self> {
        let context = model.current_context();
        let mut observed: Vec<(usize, u64)> = model
            .successors(context)
            .filter_map(|(id, count)| match table.assignment(id) {
                Some(Assignment::Residual(index)) => Some((index, count as u64)),
                _ => None,
            })
            .collect();
        observed.sort_unstable_by_key(|&(index, _)| index);

        let members = table.residual().len() as u64;
        let total = members + observed.iter().map(|&(_, c)| c).sum::<u64>();
        if total > MAX_TOTAL {
            return Err(CodecError::CapacityExceeded(format!(
                "residual frequency total {} over {}",
                total, MAX_TOTAL
            )));
        }
        Ok(Self {
            observed,
            members,
            total,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// `(cum, freq)` of residual `index`.
    pub fn interval(&self, index: usize) -> (u64, u64) {
        let mut cum = index as u64;
        let mut count = 0;
        for &(other, c) in &self.observed {
            if other < index {
                cum += c;
            } else {
                if other == index {
                    count = c;
                }
                break;
            }
        }
        (cum, 1 + count)
    }

    /// Residual index whose interval contains `target`, with its `(cum, freq)`.
    pub fn find(&self, target: u64) -> Result<(usize, u64, u64)> {
        if target >= self.total {
            return Err(CodecError::Desync(format!(
                "residual target {} outside total {}",
                target, self.total
            )));
        }
        // Walk observed successors; gaps between them are runs of freq-1 members.
        let mut index = 0u64;
        let mut cum = 0u64;
        for &(other, c) in &self.observed {
            let other = other as u64;
            let gap_end = cum + (other - index);
            if target < gap_end {
                let hit = index + (target - cum);
                return Ok((hit as usize, hit - index + cum, 1));
            }
            cum = gap_end;
            if target < cum + 1 + c {
                return Ok((other as usize, cum, 1 + c));
            }
            cum += 1 + c;
            index = other + 1;
        }
        let hit = index + (target - cum);
        if hit >= self.members {
            return Err(CodecError::Desync("residual index out of range".into()));
        }
        Ok((hit as usize, cum + (hit - index), 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::FsmScorer;
    use fsmc_core::{PositionWeighting, Symbol};

    fn model_over(data: &[u8], preseed: &[u8]) -> SymbolModel {
        let mut model = SymbolModel::new(64);
        for &b in preseed {
            model.preseed(&Symbol::Byte(b)).unwrap();
        }
        for &b in data {
            model.observe(&Symbol::Byte(b)).unwrap();
        }
        model
    }

    #[test]
    fn test_default_top_k() {
        assert_eq!(default_top_k(4), 4);
        assert_eq!(default_top_k(40), 16);
        assert_eq!(default_top_k(256), 64);
    }

    #[test]
    fn test_every_symbol_is_assigned_once() {
        let model = model_over(b"aaabbbcab", b"xyz");
        let ranking = FsmScorer::new(PositionWeighting::Linear, 1.0).rank(&model);
        let table = CodeTable::build(&model, &ranking, Some(2), true, 0);

        assert_eq!(table.ranked().len(), 2);
        let mut prefix = 0;
        let mut residual = 0;
        for id in 0..model.alphabet_len() as SymbolId {
            match table.assignment(id).unwrap() {
                Assignment::Prefix(leaf) => {
                    assert_eq!(table.leaf(leaf), Some(Leaf::Symbol(id)));
                    prefix += 1;
                }
                Assignment::Residual(index) => {
                    assert_eq!(table.residual_id(index), Some(id));
                    residual += 1;
                }
            }
        }
        assert_eq!(prefix, 2);
        assert_eq!(residual, model.alphabet_len() - 2);
        assert!(table.residual_leaf().is_some());
        assert!(table.escape_leaf().is_some());
    }

    #[test]
    fn test_fingerprint_tracks_ranking() {
        let model = model_over(b"abcabcabc", b"");
        let ranking = FsmScorer::new(PositionWeighting::Linear, 1.0).rank(&model);
        let a = CodeTable::build(&model, &ranking, None, false, 0);
        let b = CodeTable::build(&model, &ranking, None, false, 1);
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = CodeTable::build(&model, &ranking, None, true, 1);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_for_matches_built_table() {
        let model = model_over(b"abcabdabeabfabg", b"xyz");
        let ranking = FsmScorer::new(PositionWeighting::Linear, 1.0).rank(&model);
        let alphabet_len = model.alphabet_len();
        for top_k in [None, Some(1), Some(3), Some(alphabet_len), Some(alphabet_len + 5)] {
            for escape in [false, true] {
                let table = CodeTable::build(&model, &ranking, top_k, escape, 0);
                assert_eq!(
                    CodeTable::fingerprint_for(&ranking, alphabet_len, top_k, escape),
                    table.fingerprint(),
                    "top_k {:?} escape {}",
                    top_k,
                    escape
                );
            }
        }
    }

    #[test]
    fn test_code_digest_follows_code_lengths() {
        let model = model_over(b"abcabcabc", b"");
        let ranking = FsmScorer::new(PositionWeighting::Linear, 1.0).rank(&model);
        let a = CodeTable::build(&model, &ranking, None, false, 0);
        let b = CodeTable::build(&model, &ranking, None, false, 1);
        assert_eq!(a.code_digest(), b.code_digest());

        let lengths: Vec<u8> = a.code().lengths().map(|len| len as u8).collect();
        assert_eq!(a.code_digest(), block_checksum(&[&lengths]));
        let mut altered = lengths.clone();
        altered[0] = altered[0].wrapping_add(1);
        assert_ne!(a.code_digest(), block_checksum(&[&altered]));
    }

    #[test]
    fn test_residual_find_inverts_interval() {
        let model = model_over(b"qrqsqtququq", b"abcdefgh");
        let ranking = FsmScorer::new(PositionWeighting::Linear, 1.0).rank(&model);
        let table = CodeTable::build(&model, &ranking, Some(1), true, 0);
        let freqs = ResidualFrequencies::gather(&table, &model).unwrap();

        let mut expected_cum = 0;
        for index in 0..table.residual().len() {
            let (cum, freq) = freqs.interval(index);
            assert_eq!(cum, expected_cum);
            for target in cum..cum + freq {
                assert_eq!(freqs.find(target).unwrap(), (index, cum, freq));
            }
            expected_cum += freq;
        }
        assert_eq!(expected_cum, freqs.total());
        assert!(freqs.find(freqs.total()).is_err());
    }
}
