//! Subscription Registry
//!
//! Desired subscription state for one stream connection: a single global
//! mode plus a set of instrument tokens per exchange segment.
//!
//! # Design
//!
//! The registry is the single source of truth for both the live
//! subscribe path and the reconnect path. Mutations are idempotent set
//! operations, and readers take an immutable [`Subscription`] snapshot so
//! a reconnect replay never observes a half-applied update.
//!
//! The wire protocol cannot express mixed modes within one session, so
//! adding tokens under a different mode switches the whole registry.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::tick::{ExchangeSegment, SubscriptionMode};

/// Provider-documented ceiling on tokens per connection.
pub const PROVIDER_TOKEN_LIMIT: usize = 1000;

// =============================================================================
// Token List
// =============================================================================

/// Tokens for one exchange segment, in wire shape.
///
/// # Wire Format (JSON)
/// ```json
/// {"exchangeType": 1, "tokens": ["3045", "1594"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenList {
    /// Exchange segment the tokens belong to.
    #[serde(rename = "exchangeType")]
    pub exchange_segment: ExchangeSegment,
    /// Instrument tokens.
    pub tokens: Vec<String>,
}

impl TokenList {
    /// Create a token list for a segment.
    #[must_use]
    pub fn new<I, S>(exchange_segment: ExchangeSegment, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exchange_segment,
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Subscription Snapshot
// =============================================================================

/// Immutable copy of the desired subscription state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    /// Active mode, `None` while nothing is subscribed.
    pub mode: Option<SubscriptionMode>,
    /// Tokens grouped by exchange segment.
    pub tokens: BTreeMap<ExchangeSegment, BTreeSet<String>>,
}

impl Subscription {
    /// Check if there are any subscribed tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.values().all(BTreeSet::is_empty)
    }

    /// Total number of tokens across all segments.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.values().map(BTreeSet::len).sum()
    }

    /// Check whether a token is subscribed.
    #[must_use]
    pub fn contains(&self, segment: ExchangeSegment, token: &str) -> bool {
        self.tokens
            .get(&segment)
            .is_some_and(|tokens| tokens.contains(token))
    }

    /// Render the token sets as wire token lists, ordered by segment.
    #[must_use]
    pub fn token_lists(&self) -> Vec<TokenList> {
        self.tokens
            .iter()
            .filter(|(_, tokens)| !tokens.is_empty())
            .map(|(segment, tokens)| TokenList::new(*segment, tokens.iter().cloned()))
            .collect()
    }
}

// =============================================================================
// Registry Changes
// =============================================================================

/// Result of applying an `add` or `remove` to the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryChange {
    /// Tokens that were actually inserted or removed.
    pub changed: Vec<TokenList>,
    /// Set when an `add` replaced the previously active mode.
    pub replaced_mode: Option<SubscriptionMode>,
}

impl RegistryChange {
    /// Check if the operation altered the registry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.replaced_mode.is_none()
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe record of the desired subscription.
///
/// # Example
///
/// ```rust
/// use tick_stream::domain::subscription::SubscriptionRegistry;
/// use tick_stream::domain::tick::{ExchangeSegment, SubscriptionMode};
///
/// let registry = SubscriptionRegistry::new();
/// registry.add(SubscriptionMode::Ltp, ExchangeSegment::NSE_CM, &["3045".to_string()]);
///
/// // Duplicate adds are no-ops
/// let change = registry.add(SubscriptionMode::Ltp, ExchangeSegment::NSE_CM, &["3045".to_string()]);
/// assert!(change.is_empty());
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot.mode, Some(SubscriptionMode::Ltp));
/// assert_eq!(snapshot.token_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Subscription>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tokens for a segment under `mode`.
    ///
    /// A different `mode` than the active one replaces the mode for every
    /// token already held.
    pub fn add(
        &self,
        mode: SubscriptionMode,
        segment: ExchangeSegment,
        tokens: &[String],
    ) -> RegistryChange {
        let mut change = RegistryChange::default();
        if tokens.is_empty() {
            return change;
        }

        let mut state = self.inner.lock();
        let current = state.mode;

        match current {
            Some(active) if active != mode => {
                tracing::warn!(
                    previous = %active,
                    requested = %mode,
                    "Mixed-mode subscriptions are not representable, switching registry mode"
                );
                change.replaced_mode = Some(active);
                state.mode = Some(mode);
            }
            Some(_) => {}
            None => state.mode = Some(mode),
        }

        let added: Vec<String> = {
            let set = state.tokens.entry(segment).or_default();
            tokens
                .iter()
                .filter(|token| set.insert((*token).clone()))
                .cloned()
                .collect()
        };

        if !added.is_empty() {
            change.changed.push(TokenList::new(segment, added));
        }

        let total = state.token_count();
        if total > PROVIDER_TOKEN_LIMIT {
            tracing::warn!(
                total,
                limit = PROVIDER_TOKEN_LIMIT,
                "Subscribed token count exceeds provider limit"
            );
        }

        change
    }

    /// Remove tokens for a segment.
    ///
    /// The `mode` argument mirrors the wire unsubscribe message; removal
    /// itself is mode-independent. Emptying the registry clears the mode.
    pub fn remove(
        &self,
        mode: SubscriptionMode,
        segment: ExchangeSegment,
        tokens: &[String],
    ) -> RegistryChange {
        let mut state = self.inner.lock();
        let mut change = RegistryChange::default();

        if state.mode.is_some_and(|active| active != mode) {
            tracing::debug!(requested = %mode, "Removing tokens held under a different mode");
        }

        if let Some(set) = state.tokens.get_mut(&segment) {
            let removed: Vec<String> = tokens
                .iter()
                .filter(|token| set.remove(token.as_str()))
                .cloned()
                .collect();

            if set.is_empty() {
                state.tokens.remove(&segment);
            }

            if !removed.is_empty() {
                change.changed.push(TokenList::new(segment, removed));
            }
        }

        if state.tokens.is_empty() {
            state.mode = None;
        }

        change
    }

    /// Remove every token and reset the mode, returning what was held.
    pub fn clear(&self) -> Subscription {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Immutable copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Subscription {
        self.inner.lock().clone()
    }

    /// Total number of subscribed tokens.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.inner.lock().token_count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn add_is_idempotent() {
        let registry = SubscriptionRegistry::new();

        let first = registry.add(
            SubscriptionMode::Ltp,
            ExchangeSegment::NSE_CM,
            &tokens(&["3045", "1594"]),
        );
        assert_eq!(first.changed.len(), 1);
        assert_eq!(first.changed[0].tokens, vec!["3045", "1594"]);

        let second = registry.add(
            SubscriptionMode::Ltp,
            ExchangeSegment::NSE_CM,
            &tokens(&["3045"]),
        );
        assert!(second.is_empty());
        assert_eq!(registry.token_count(), 2);
    }

    #[test]
    fn add_reports_only_new_tokens() {
        let registry = SubscriptionRegistry::new();
        registry.add(SubscriptionMode::Ltp, ExchangeSegment::NSE_CM, &tokens(&["3045"]));

        let change = registry.add(
            SubscriptionMode::Ltp,
            ExchangeSegment::NSE_CM,
            &tokens(&["3045", "1594"]),
        );
        assert_eq!(change.changed[0].tokens, vec!["1594"]);
    }

    #[test]
    fn add_with_new_mode_replaces_mode() {
        let registry = SubscriptionRegistry::new();
        registry.add(SubscriptionMode::Ltp, ExchangeSegment::NSE_CM, &tokens(&["3045"]));

        let change = registry.add(
            SubscriptionMode::Quote,
            ExchangeSegment::NSE_FO,
            &tokens(&["35003"]),
        );
        assert_eq!(change.replaced_mode, Some(SubscriptionMode::Ltp));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.mode, Some(SubscriptionMode::Quote));
        assert!(snapshot.contains(ExchangeSegment::NSE_CM, "3045"));
        assert!(snapshot.contains(ExchangeSegment::NSE_FO, "35003"));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        registry.add(
            SubscriptionMode::Ltp,
            ExchangeSegment::NSE_CM,
            &tokens(&["3045", "1594"]),
        );

        let change = registry.remove(
            SubscriptionMode::Ltp,
            ExchangeSegment::NSE_CM,
            &tokens(&["3045"]),
        );
        assert_eq!(change.changed[0].tokens, vec!["3045"]);

        let again = registry.remove(
            SubscriptionMode::Ltp,
            ExchangeSegment::NSE_CM,
            &tokens(&["3045"]),
        );
        assert!(again.is_empty());
        assert_eq!(registry.token_count(), 1);
    }

    #[test]
    fn removing_last_token_clears_mode() {
        let registry = SubscriptionRegistry::new();
        registry.add(SubscriptionMode::Quote, ExchangeSegment::BSE_CM, &tokens(&["500325"]));
        registry.remove(SubscriptionMode::Quote, ExchangeSegment::BSE_CM, &tokens(&["500325"]));

        let snapshot = registry.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.mode, None);
        assert!(snapshot.tokens.is_empty());
    }

    #[test]
    fn remove_unknown_segment_is_noop() {
        let registry = SubscriptionRegistry::new();
        let change = registry.remove(
            SubscriptionMode::Ltp,
            ExchangeSegment::MCX_FO,
            &tokens(&["1"]),
        );
        assert!(change.is_empty());
    }

    #[test]
    fn clear_returns_previous_state() {
        let registry = SubscriptionRegistry::new();
        registry.add(SubscriptionMode::Ltp, ExchangeSegment::NSE_CM, &tokens(&["3045"]));

        let previous = registry.clear();
        assert_eq!(previous.token_count(), 1);
        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.snapshot().mode, None);
    }

    #[test]
    fn snapshot_is_detached() {
        let registry = SubscriptionRegistry::new();
        registry.add(SubscriptionMode::Ltp, ExchangeSegment::NSE_CM, &tokens(&["3045"]));

        let snapshot = registry.snapshot();
        registry.add(SubscriptionMode::Ltp, ExchangeSegment::NSE_CM, &tokens(&["1594"]));

        assert_eq!(snapshot.token_count(), 1);
        assert_eq!(registry.token_count(), 2);
    }

    #[test]
    fn token_lists_are_ordered_by_segment() {
        let registry = SubscriptionRegistry::new();
        registry.add(SubscriptionMode::Ltp, ExchangeSegment::MCX_FO, &tokens(&["234230"]));
        registry.add(SubscriptionMode::Ltp, ExchangeSegment::NSE_CM, &tokens(&["3045", "1594"]));

        let lists = registry.snapshot().token_lists();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].exchange_segment, ExchangeSegment::NSE_CM);
        assert_eq!(lists[0].tokens, vec!["1594", "3045"]);
        assert_eq!(lists[1].exchange_segment, ExchangeSegment::MCX_FO);
    }

    #[test]
    fn token_list_wire_shape() {
        let list = TokenList::new(ExchangeSegment::NSE_CM, ["3045"]);
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"{"exchangeType":1,"tokens":["3045"]}"#);
    }

    #[test]
    fn concurrent_adds_are_serialized() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        registry.add(
                            SubscriptionMode::Ltp,
                            ExchangeSegment::NSE_CM,
                            &[format!("{i}-{j}")],
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.token_count(), 400);
    }
}
