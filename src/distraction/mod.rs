//! Deciding when to interrupt playback, and with what.
//!
//! The scheduler counts emitted chars. Once the count crosses a threshold
//! drawn uniformly from a configured range, it picks a kind: kinds still in
//! their cooldown are skipped, the first kind in precedence order that has
//! gone unfired for `force_after` chars wins outright, and otherwise the
//! choice is weighted random.

pub mod sequence;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistractionKind {
    Aside,
    Chat,
    TerminalNoise,
    FileHop,
}

impl DistractionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DistractionKind::Aside => "aside",
            DistractionKind::Chat => "chat",
            DistractionKind::TerminalNoise => "terminal_noise",
            DistractionKind::FileHop => "file_hop",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindPolicy {
    pub kind: DistractionKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Chars that must pass after this kind fires before it may fire again.
    #[serde(default)]
    pub min_spacing: u32,
    /// Once this many chars pass without the kind firing, it preempts the
    /// random draw.
    #[serde(default)]
    pub force_after: Option<u32>,
}

fn default_enabled() -> bool {
    true
}
fn default_weight() -> u32 {
    1
}

impl KindPolicy {
    pub fn new(kind: DistractionKind, weight: u32, min_spacing: u32, force_after: Option<u32>) -> Self {
        Self {
            kind,
            enabled: true,
            weight,
            min_spacing,
            force_after,
        }
    }
}

/// Default policies, in precedence order.
pub fn default_policies() -> Vec<KindPolicy> {
    vec![
        KindPolicy::new(DistractionKind::TerminalNoise, 2, 120, Some(300)),
        KindPolicy::new(DistractionKind::Chat, 2, 150, Some(400)),
        KindPolicy::new(DistractionKind::Aside, 5, 30, None),
        KindPolicy::new(DistractionKind::FileHop, 3, 60, None),
    ]
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistractionState {
    pub keystrokes_since_action: u32,
    pub next_action_threshold: u32,
    /// Chars since each policy's kind last fired, aligned with the policies.
    pub since_kind: Vec<u32>,
    pub total_keystrokes: u64,
}

pub struct Scheduler {
    policies: Vec<KindPolicy>,
    threshold_min: u32,
    threshold_max: u32,
    enabled: bool,
    state: DistractionState,
    rng: SmallRng,
}

impl Scheduler {
    pub fn new(policies: Vec<KindPolicy>, threshold_min: u32, threshold_max: u32) -> Self {
        Self::with_rng(policies, threshold_min, threshold_max, SmallRng::from_entropy())
    }

    pub fn with_rng(
        policies: Vec<KindPolicy>,
        threshold_min: u32,
        threshold_max: u32,
        rng: SmallRng,
    ) -> Self {
        let threshold_min = threshold_min.max(1);
        let threshold_max = threshold_max.max(threshold_min);
        let mut scheduler = Self {
            state: DistractionState {
                since_kind: vec![0; policies.len()],
                ..DistractionState::default()
            },
            policies,
            threshold_min,
            threshold_max,
            enabled: true,
            rng,
        };
        scheduler.redraw_threshold();
        scheduler
    }

    pub fn state(&self) -> &DistractionState {
        &self.state
    }

    pub fn policies(&self) -> &[KindPolicy] {
        &self.policies
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start counting from scratch, e.g. for a new scene.
    pub fn reset(&mut self) {
        self.state = DistractionState {
            since_kind: vec![0; self.policies.len()],
            ..DistractionState::default()
        };
        self.redraw_threshold();
    }

    fn redraw_threshold(&mut self) {
        self.state.next_action_threshold = self.rng.gen_range(self.threshold_min..=self.threshold_max);
    }

    /// Count one emitted char and maybe pick a distraction to run now.
    pub fn on_character_emitted(&mut self) -> Option<DistractionKind> {
        self.state.total_keystrokes += 1;
        self.state.keystrokes_since_action = self.state.keystrokes_since_action.saturating_add(1);
        for count in &mut self.state.since_kind {
            *count = count.saturating_add(1);
        }

        if !self.enabled || self.state.keystrokes_since_action < self.state.next_action_threshold {
            return None;
        }

        let idx = self.select()?;
        let kind = self.policies[idx].kind;
        debug!(
            kind = kind.as_str(),
            after = self.state.keystrokes_since_action,
            "distraction fired"
        );
        self.state.keystrokes_since_action = 0;
        self.state.since_kind[idx] = 0;
        self.redraw_threshold();
        Some(kind)
    }

    fn select(&mut self) -> Option<usize> {
        let eligible: Vec<usize> = (0..self.policies.len())
            .filter(|&i| {
                let policy = &self.policies[i];
                policy.enabled && self.state.since_kind[i] >= policy.min_spacing
            })
            .collect();

        if let Some(&forced) = eligible.iter().find(|&&i| {
            self.policies[i]
                .force_after
                .is_some_and(|limit| self.state.since_kind[i] >= limit)
        }) {
            return Some(forced);
        }

        let total: u32 = eligible.iter().map(|&i| self.policies[i].weight).sum();
        if total == 0 {
            return None;
        }
        let mut roll = self.rng.gen_range(0..total);
        for &i in &eligible {
            let weight = self.policies[i].weight;
            if roll < weight {
                return Some(i);
            }
            roll -= weight;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(policies: Vec<KindPolicy>, min: u32, max: u32) -> Scheduler {
        Scheduler::with_rng(policies, min, max, SmallRng::seed_from_u64(11))
    }

    #[test]
    fn test_threshold_drawn_in_range() {
        let mut s = scheduler(default_policies(), 5, 9);
        for _ in 0..200 {
            let threshold = s.state().next_action_threshold;
            assert!((5..=9).contains(&threshold));
            s.reset();
        }
    }

    #[test]
    fn test_fires_exactly_at_threshold() {
        let mut s = scheduler(vec![KindPolicy::new(DistractionKind::Aside, 1, 0, None)], 4, 4);
        assert_eq!(s.on_character_emitted(), None);
        assert_eq!(s.on_character_emitted(), None);
        assert_eq!(s.on_character_emitted(), None);
        assert_eq!(s.on_character_emitted(), Some(DistractionKind::Aside));
        assert_eq!(s.state().keystrokes_since_action, 0);
        assert_eq!(s.state().total_keystrokes, 4);
    }

    #[test]
    fn test_cooldown_blocks_and_stays_armed() {
        let mut s = scheduler(vec![KindPolicy::new(DistractionKind::Chat, 1, 10, None)], 2, 2);
        for _ in 0..9 {
            assert_eq!(s.on_character_emitted(), None);
        }
        // Threshold long passed, but the only kind is still cooling down.
        assert_eq!(s.state().keystrokes_since_action, 9);
        assert_eq!(s.on_character_emitted(), Some(DistractionKind::Chat));
    }

    #[test]
    fn test_min_spacing_respected_between_firings() {
        let mut s = scheduler(
            vec![
                KindPolicy::new(DistractionKind::Aside, 1, 0, None),
                KindPolicy::new(DistractionKind::Chat, 100, 20, None),
            ],
            1,
            1,
        );
        let mut last_chat: Option<u64> = None;
        for _ in 0..500 {
            if s.on_character_emitted() == Some(DistractionKind::Chat) {
                let now = s.state().total_keystrokes;
                if let Some(prev) = last_chat {
                    assert!(now - prev >= 20);
                }
                last_chat = Some(now);
            }
        }
        assert!(last_chat.is_some());
    }

    #[test]
    fn test_force_after_preempts_weights() {
        let mut s = scheduler(
            vec![
                KindPolicy::new(DistractionKind::TerminalNoise, 0, 0, Some(5)),
                KindPolicy::new(DistractionKind::Aside, 1000, 0, None),
            ],
            1,
            1,
        );
        let fired: Vec<_> = (0..5).map(|_| s.on_character_emitted()).collect();
        // Weight zero never wins a draw, so only the override can pick it.
        assert_eq!(fired[..4], [Some(DistractionKind::Aside); 4]);
        assert_eq!(fired[4], Some(DistractionKind::TerminalNoise));
    }

    #[test]
    fn test_force_precedence_is_list_order() {
        let mut s = scheduler(
            vec![
                KindPolicy::new(DistractionKind::Chat, 1, 0, Some(3)),
                KindPolicy::new(DistractionKind::TerminalNoise, 1, 0, Some(3)),
            ],
            3,
            3,
        );
        s.on_character_emitted();
        s.on_character_emitted();
        assert_eq!(s.on_character_emitted(), Some(DistractionKind::Chat));
    }

    #[test]
    fn test_disabled_kinds_and_scheduler() {
        let mut policy = KindPolicy::new(DistractionKind::Aside, 1, 0, None);
        policy.enabled = false;
        let mut s = scheduler(vec![policy], 1, 1);
        assert_eq!(s.on_character_emitted(), None);

        let mut s = scheduler(default_policies(), 1, 1);
        s.set_enabled(false);
        for _ in 0..1000 {
            assert_eq!(s.on_character_emitted(), None);
        }
        assert_eq!(s.state().total_keystrokes, 1000);
    }
}
