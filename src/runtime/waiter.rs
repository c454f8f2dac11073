//! Edge waiter: a forward-only cursor over a bus sample stream
//!
//! [`EdgeWaiter`] pulls samples from any iterator and stops at the first
//! sample satisfying one of several alternative condition sets. Every
//! condition inside one alternative must hold on the same sample; the
//! returned [`Matched`] reports which alternatives held.
//!
//! Edge conditions compare a sample with the one before it, so the very
//! first sample of a stream only establishes the baseline. Level conditions
//! can match immediately.

use super::sample::{BusSample, Line};
use tracing::trace;

/// Transition or level required on a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Low to high
    Rising,
    /// High to low
    Falling,
    /// Any change
    Either,
    /// Line is high
    High,
    /// Line is low
    Low,
}

/// A single condition on one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub line: Line,
    pub edge: Edge,
}

impl Condition {
    pub const fn new(line: Line, edge: Edge) -> Self {
        Self { line, edge }
    }

    pub const fn rising(line: Line) -> Self {
        Self::new(line, Edge::Rising)
    }

    pub const fn falling(line: Line) -> Self {
        Self::new(line, Edge::Falling)
    }

    /// Whether this condition holds on `current`, given the sample before it.
    pub fn holds(&self, previous: Option<&BusSample>, current: &BusSample) -> bool {
        let now = current.get(self.line);
        let was = previous.map(|p| p.get(self.line));
        match (self.edge, was) {
            (Edge::High, _) => now,
            (Edge::Low, _) => !now,
            (_, None) => false,
            (Edge::Rising, Some(was)) => !was && now,
            (Edge::Falling, Some(was)) => was && !now,
            (Edge::Either, Some(was)) => was != now,
        }
    }
}

/// Result of a successful [`EdgeWaiter::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matched {
    /// The sample on which the match happened
    pub sample: BusSample,
    mask: u32,
}

impl Matched {
    /// Whether alternative `index` held on the matched sample
    #[inline]
    pub fn matched(&self, index: usize) -> bool {
        index < 32 && self.mask & (1 << index) != 0
    }
}

/// Pull-based cursor that scans a sample stream for edge conditions
pub struct EdgeWaiter<I> {
    samples: I,
    previous: Option<BusSample>,
    consumed: u64,
}

impl<I: Iterator<Item = BusSample>> EdgeWaiter<I> {
    /// Wrap a sample source
    pub fn new<S>(samples: S) -> Self
    where
        S: IntoIterator<IntoIter = I, Item = BusSample>,
    {
        Self {
            samples: samples.into_iter(),
            previous: None,
            consumed: 0,
        }
    }

    /// Advance to the first sample where at least one alternative holds.
    ///
    /// At most 32 alternatives are supported; an empty alternative never
    /// matches. Returns `None` once the stream is exhausted, which is the
    /// normal end of a decode.
    pub fn wait(&mut self, alternatives: &[&[Condition]]) -> Option<Matched> {
        debug_assert!(alternatives.len() <= 32, "too many wait alternatives");

        for sample in self.samples.by_ref() {
            let previous = self.previous.replace(sample);
            self.consumed += 1;

            let mask = alternatives
                .iter()
                .enumerate()
                .filter(|(_, conditions)| {
                    !conditions.is_empty()
                        && conditions.iter().all(|c| c.holds(previous.as_ref(), &sample))
                })
                .fold(0u32, |mask, (i, _)| mask | (1 << i));

            if mask != 0 {
                trace!("wait matched {:#b} at {}", mask, sample);
                return Some(Matched { sample, mask });
            }
        }

        None
    }

    /// Number of samples consumed so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Last sample consumed, if any
    pub fn previous(&self) -> Option<&BusSample> {
        self.previous.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(levels: &[u8]) -> Vec<BusSample> {
        levels
            .iter()
            .enumerate()
            .map(|(t, &lines)| BusSample::new(t as u64 * 10, lines))
            .collect()
    }

    #[test]
    fn test_first_sample_is_baseline_for_edges() {
        let clk = Line::Clk.mask();
        let mut waiter = EdgeWaiter::new(stream(&[clk, 0, clk]));

        // The first sample is high but cannot be a rising edge
        let hit = waiter.wait(&[&[Condition::rising(Line::Clk)]]).unwrap();
        assert_eq!(hit.sample.timestamp, 20);
        assert_eq!(waiter.consumed(), 3);
    }

    #[test]
    fn test_level_matches_first_sample() {
        let mut waiter = EdgeWaiter::new(stream(&[0, Line::Cs.mask()]));
        let hit = waiter
            .wait(&[&[Condition::new(Line::Cs, Edge::Low)]])
            .unwrap();
        assert_eq!(hit.sample.timestamp, 0);
    }

    #[test]
    fn test_alternatives_report_mask() {
        let cs = Line::Cs.mask();
        let clk = Line::Clk.mask();
        // CS falls at t=10, CLK rises at t=20, CS rises together with CLK falling at t=30
        let mut waiter = EdgeWaiter::new(stream(&[cs, 0, clk, cs]));

        let deassert = [Condition::rising(Line::Cs)];
        let clock = [Condition::rising(Line::Clk)];

        assert!(waiter.wait(&[&[Condition::falling(Line::Cs)]]).is_some());

        let hit = waiter.wait(&[&deassert, &clock]).unwrap();
        assert!(!hit.matched(0));
        assert!(hit.matched(1));
        assert_eq!(hit.sample.timestamp, 20);

        let hit = waiter.wait(&[&deassert, &clock]).unwrap();
        assert!(hit.matched(0));
        assert!(!hit.matched(1));
        assert_eq!(hit.sample.timestamp, 30);

        assert!(waiter.wait(&[&deassert, &clock]).is_none());
    }

    #[test]
    fn test_all_conditions_in_alternative_must_hold() {
        let cs = Line::Cs.mask();
        let clk = Line::Clk.mask();
        let mut waiter = EdgeWaiter::new(stream(&[0, clk, 0, clk | cs]));

        let both = [Condition::rising(Line::Clk), Condition::new(Line::Cs, Edge::High)];
        let hit = waiter.wait(&[&both]).unwrap();
        assert_eq!(hit.sample.timestamp, 30);
    }

    #[test]
    fn test_either_edge_and_exhaustion() {
        let d0 = Line::D0.mask();
        let mut waiter = EdgeWaiter::new(stream(&[0, 0, d0, d0, 0]));
        let either = [Condition::new(Line::D0, Edge::Either)];

        assert_eq!(waiter.wait(&[&either]).unwrap().sample.timestamp, 20);
        assert_eq!(waiter.wait(&[&either]).unwrap().sample.timestamp, 40);
        assert!(waiter.wait(&[&either]).is_none());
        assert_eq!(waiter.previous().map(|s| s.timestamp), Some(40));
    }

    #[test]
    fn test_empty_alternative_never_matches() {
        let mut waiter = EdgeWaiter::new(stream(&[0, 1, 0, 1]));
        assert!(waiter.wait(&[&[]]).is_none());
    }
}
