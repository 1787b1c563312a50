use crate::format::StreamHeader;
use crate::model::{Observation, SymbolId, SymbolModel};
use crate::scorer::FsmScorer;
use crate::table::{Assignment, CodeTable, ResidualFrequencies};
use fsmc_core::{CodecError, Result, Symbol};

/// How one symbol is coded under the active table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Prefix(usize),
    Residual(usize),
    Escape,
}

/// The model-and-table state machine both ends of a stream run in lockstep.
///
/// ## Rebuild Schedule
/// Before every symbol whose index is a multiple of `rebuild_interval` the
/// window is ranked. The encoder installs a new table only when the ranking
/// fingerprint changes and announces it with a snapshot marker; the decoder
/// rebuilds at each marker and cross-checks. Schedules are counted in
/// symbols, never in flushes, so batching has no effect on the bitstream.
#[derive(Debug)]
pub struct ModelReplay {
    model: SymbolModel,
    scorer: FsmScorer,
    table: Option<CodeTable>,
    top_k: Option<usize>,
    escape: bool,
    rebuild_interval: u64,
    installed: u64,
}

impl ModelReplay {
    pub fn new(header: &StreamHeader) -> Result<Self> {
        let mut model = SymbolModel::new(header.window);
        for symbol in &header.preseed {
            if symbol.mode() != header.mode {
                return Err(CodecError::ModeMismatch {
                    expected: header.mode,
                    found: symbol.mode(),
                });
            }
            model.preseed(symbol)?;
        }
        Ok(Self {
            model,
            scorer: FsmScorer::new(header.weighting, header.decay),
            table: None,
            top_k: header.top_k,
            escape: header.escape,
            rebuild_interval: header.rebuild_interval.max(1) as u64,
            installed: 0,
        })
    }

    pub fn model(&self) -> &SymbolModel {
        &self.model
    }

    pub fn table(&self) -> Option<&CodeTable> {
        self.table.as_ref()
    }

    /// Symbols processed so far; the index of the next symbol.
    pub fn position(&self) -> u64 {
        self.model.observed()
    }

    /// Epoch the next installed table will carry.
    pub fn next_epoch(&self) -> u64 {
        self.installed
    }

    pub fn rebuild_interval(&self) -> u64 {
        self.rebuild_interval
    }

    pub fn at_check_point(&self) -> bool {
        self.position() % self.rebuild_interval == 0
    }

    /// Table built from the current window, regardless of the live one.
    pub fn rebuild(&self) -> CodeTable {
        let ranking = self.scorer.rank(&self.model);
        CodeTable::build(&self.model, &ranking, self.top_k, self.escape, self.installed)
    }

    /// A new table if the ranking moved since the live one was built. An
    /// unchanged ranking costs a rank pass and a fingerprint, no table build.
    pub fn propose(&self) -> Option<CodeTable> {
        let ranking = self.scorer.rank(&self.model);
        if let Some(live) = &self.table {
            let fingerprint = CodeTable::fingerprint_for(
                &ranking,
                self.model.alphabet_len(),
                self.top_k,
                self.escape,
            );
            if fingerprint == live.fingerprint() {
                return None;
            }
        }
        Some(CodeTable::build(&self.model, &ranking, self.top_k, self.escape, self.installed))
    }

    pub fn install(&mut self, table: CodeTable) {
        tracing::debug!(
            "ModelReplay: epoch {} at symbol {} ({} ranked)",
            table.epoch(),
            self.position(),
            table.ranked().len()
        );
        self.table = Some(table);
        self.installed += 1;
    }

    /// Coding step for `symbol`. Never mutates.
    pub fn classify(&self, symbol: &Symbol) -> Result<Step> {
        let Some(id) = self.model.lookup(symbol) else {
            if self.escape {
                return Ok(Step::Escape);
            }
            return Err(CodecError::UnknownSymbol(symbol.to_string()));
        };
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| CodecError::Desync("no code table installed".into()))?;
        match table.assignment(id) {
            Some(Assignment::Prefix(leaf)) => Ok(Step::Prefix(leaf)),
            Some(Assignment::Residual(index)) => Ok(Step::Residual(index)),
            None => Err(CodecError::Desync(format!("{} missing from code table", symbol))),
        }
    }

    /// Residual frequencies at the current context.
    pub fn residual_frequencies(&self) -> Result<ResidualFrequencies> {
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| CodecError::Desync("no code table installed".into()))?;
        ResidualFrequencies::gather(table, &self.model)
    }

    /// Observes `symbol`; a novel one also joins the live residual set.
    pub fn advance(&mut self, symbol: &Symbol) -> Result<Observation> {
        let observation = self.model.observe(symbol)?;
        if observation.novel {
            if let Some(table) = self.table.as_mut() {
                table.admit(observation.id);
            }
        }
        Ok(observation)
    }

    pub fn advance_known(&mut self, id: SymbolId) -> Result<Observation> {
        self.model.observe_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsmc_core::CodecConfig;

    fn replay_over(data: &[u8]) -> ModelReplay {
        let header = StreamHeader::new(&CodecConfig::default(), Vec::new());
        let mut replay = ModelReplay::new(&header).unwrap();
        for &b in data {
            replay.advance(&Symbol::Byte(b)).unwrap();
        }
        replay
    }

    #[test]
    fn test_propose_keeps_live_table_on_same_ranking() {
        let mut replay = replay_over(b"abcabcabc");
        let first = replay.propose().expect("no live table yet");
        let fingerprint = first.fingerprint();
        replay.install(first);
        assert!(replay.propose().is_none());
        assert_eq!(replay.rebuild().fingerprint(), fingerprint);
    }

    #[test]
    fn test_propose_rebuilds_when_ranking_moves() {
        let mut replay = replay_over(b"ab");
        let first = replay.propose().unwrap();
        replay.install(first);
        for &b in b"zzzzzzzzzzzzzzzz" {
            replay.advance(&Symbol::Byte(b)).unwrap();
        }
        let next = replay.propose().expect("ranking moved");
        assert_eq!(next.epoch(), 1);
        assert_eq!(next.ranked().first(), replay.rebuild().ranked().first());
    }
}
