//! Post triage state and deck views.
//!
//! [`DeckStateMachine`] owns the post collection. Each post carries exactly
//! one [`PostStatus`]; the only ways to change it are the transitions below
//! and the explicit full-state edits (`replace_posts`, `apply_remote_status`).
//!
//! ```text
//! inbox ──save──▶ pending ──save/discard──▶ cleared
//!   └──────────discard──────────────────────▶ cleared
//! any ──favorite──▶ favorite
//! ```
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::gesture::SwipeDirection;
use crate::storage::{Post, PostSource, PostStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deck {
    Inbox,
    Saved,
    Favorites,
    Twitter,
    Highlights,
}

impl Deck {
    pub const ALL: [Deck; 5] = [
        Deck::Inbox,
        Deck::Saved,
        Deck::Favorites,
        Deck::Twitter,
        Deck::Highlights,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Deck::Inbox => "inbox",
            Deck::Saved => "saved",
            Deck::Favorites => "favorites",
            Deck::Twitter => "twitter",
            Deck::Highlights => "highlights",
        }
    }

    /// Swipe decks present one card at a time; the rest are plain listings.
    pub fn is_swipeable(self) -> bool {
        matches!(self, Deck::Inbox | Deck::Saved)
    }

    /// Whether `post` belongs in this deck. `highlighted` holds the links of
    /// articles with at least one highlight.
    pub fn matches(self, post: &Post, highlighted: &HashSet<String>) -> bool {
        match self {
            Deck::Inbox => post.status == PostStatus::Inbox,
            Deck::Saved => post.status == PostStatus::Pending,
            Deck::Favorites => post.status == PostStatus::Favorite,
            Deck::Twitter => post.source == PostSource::Twitter,
            Deck::Highlights => highlighted.contains(&post.link),
        }
    }
}

impl fmt::Display for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown deck: {0} (expected inbox, saved, favorites, twitter or highlights)")]
pub struct UnknownDeck(pub String);

impl FromStr for Deck {
    type Err = UnknownDeck;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Deck::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| UnknownDeck(s.to_string()))
    }
}

/// A status change that actually happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub link: String,
    pub from: PostStatus,
    pub to: PostStatus,
}

/// Badge counts for every deck.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeckCounts {
    pub inbox: usize,
    pub saved: usize,
    pub favorites: usize,
    pub twitter: usize,
    pub highlights: usize,
}

impl DeckCounts {
    pub fn get(&self, deck: Deck) -> usize {
        match deck {
            Deck::Inbox => self.inbox,
            Deck::Saved => self.saved,
            Deck::Favorites => self.favorites,
            Deck::Twitter => self.twitter,
            Deck::Highlights => self.highlights,
        }
    }
}

pub struct DeckStateMachine {
    posts: Vec<Post>,
    index: HashMap<String, usize>,
    highlighted: HashSet<String>,
    active: Deck,
    /// Snapshot of the active deck taken at switch time, as indices into `posts`.
    queue: Vec<usize>,
    /// Paging cursor into `queue`. Swiped cards sit before it.
    cursor: usize,
}

impl DeckStateMachine {
    /// Build from a post collection, starting on the inbox deck.
    /// Duplicate links keep their first occurrence.
    pub fn new(posts: Vec<Post>) -> Self {
        let mut machine = Self {
            posts: Vec::new(),
            index: HashMap::new(),
            highlighted: HashSet::new(),
            active: Deck::Inbox,
            queue: Vec::new(),
            cursor: 0,
        };
        machine.replace_posts(posts);
        machine
    }

    /// Replace the whole collection and reload the active deck.
    pub fn replace_posts(&mut self, posts: Vec<Post>) {
        self.posts.clear();
        self.index.clear();
        for post in posts {
            if self.index.contains_key(&post.link) {
                tracing::debug!(link = %post.link, "Skipping duplicate post");
                continue;
            }
            self.index.insert(post.link.clone(), self.posts.len());
            self.posts.push(post);
        }
        self.switch_deck(self.active);
    }

    /// Make `deck` active, reset the cursor and re-derive its posts.
    pub fn switch_deck(&mut self, deck: Deck) {
        self.active = deck;
        self.cursor = 0;
        self.queue = self
            .posts
            .iter()
            .enumerate()
            .filter(|(_, p)| deck.matches(p, &self.highlighted))
            .map(|(i, _)| i)
            .collect();
        tracing::debug!(deck = %deck, posts = self.queue.len(), "Switched deck");
    }

    /// Re-derive the active deck from current statuses.
    pub fn reload(&mut self) {
        self.switch_deck(self.active);
    }

    pub fn active_deck(&self) -> Deck {
        self.active
    }

    /// Posts shown by the active deck. For swipe decks this is the current
    /// card and everything queued behind it.
    ///
    /// Queued posts whose status no longer matches the deck are left out.
    /// Posts that joined the deck since the last switch show after the next
    /// one. [`current`](Self::current) keeps following the queue so a card
    /// that is animating out stays on screen.
    pub fn visible(&self) -> Vec<&Post> {
        let start = if self.active.is_swipeable() {
            self.cursor
        } else {
            0
        };
        self.queue[start.min(self.queue.len())..]
            .iter()
            .map(|&i| &self.posts[i])
            .filter(|p| self.active.matches(p, &self.highlighted))
            .collect()
    }

    /// The card on top of a swipe deck.
    pub fn current(&self) -> Option<&Post> {
        if !self.active.is_swipeable() {
            return None;
        }
        self.queue.get(self.cursor).map(|&i| &self.posts[i])
    }

    /// The card rendered underneath the current one.
    pub fn peek_next(&self) -> Option<&Post> {
        if !self.active.is_swipeable() {
            return None;
        }
        self.queue.get(self.cursor + 1).map(|&i| &self.posts[i])
    }

    /// Move past the current card. Swiped cards are never shown again until
    /// the deck is switched or reloaded.
    pub fn advance(&mut self) -> Option<&Post> {
        if self.cursor < self.queue.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Cards left in a swipe deck, including the current one.
    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.cursor)
    }

    pub fn post(&self, link: &str) -> Option<&Post> {
        self.index.get(link).map(|&i| &self.posts[i])
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Update which articles have highlights. Takes effect on next switch.
    pub fn set_highlighted(&mut self, links: HashSet<String>) {
        self.highlighted = links;
    }

    pub fn counts(&self) -> DeckCounts {
        let count = |deck: Deck| {
            self.posts
                .iter()
                .filter(|p| deck.matches(p, &self.highlighted))
                .count()
        };
        DeckCounts {
            inbox: count(Deck::Inbox),
            saved: count(Deck::Saved),
            favorites: count(Deck::Favorites),
            twitter: count(Deck::Twitter),
            highlights: count(Deck::Highlights),
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// `inbox → cleared` or `pending → cleared`. No-op if already cleared.
    pub fn mark_as_cleared(&mut self, link: &str) -> Option<Transition> {
        self.transition(link, PostStatus::Cleared, &[PostStatus::Inbox, PostStatus::Pending])
    }

    /// `inbox → pending`. No-op if already pending.
    pub fn mark_as_pending(&mut self, link: &str) -> Option<Transition> {
        self.transition(link, PostStatus::Pending, &[PostStatus::Inbox])
    }

    /// Any status to favorite. Explicit action, never a swipe.
    pub fn mark_as_favorite(&mut self, link: &str) -> Option<Transition> {
        self.transition(
            link,
            PostStatus::Favorite,
            &[PostStatus::Inbox, PostStatus::Pending, PostStatus::Cleared],
        )
    }

    /// Apply a committed swipe on `link` according to the active deck.
    ///
    /// Inbox: left clears, right saves. Saved: either direction clears.
    /// List decks ignore swipes.
    pub fn apply_swipe(&mut self, link: &str, direction: SwipeDirection) -> Option<Transition> {
        match (self.active, direction) {
            (Deck::Inbox, SwipeDirection::Left) => self.mark_as_cleared(link),
            (Deck::Inbox, SwipeDirection::Right) => self.mark_as_pending(link),
            (Deck::Saved, _) => self.mark_as_cleared(link),
            (deck, _) => {
                tracing::debug!(deck = %deck, link, "Swipe on a list deck ignored");
                None
            }
        }
    }

    /// Overwrite a status from an external full-state edit (cloud pull).
    ///
    /// The visible queue is left alone; the change shows on next switch.
    pub fn apply_remote_status(&mut self, link: &str, status: PostStatus) -> bool {
        match self.index.get(link) {
            Some(&i) => {
                self.posts[i].status = status;
                true
            }
            None => false,
        }
    }

    fn transition(
        &mut self,
        link: &str,
        to: PostStatus,
        allowed_from: &[PostStatus],
    ) -> Option<Transition> {
        let Some(&i) = self.index.get(link) else {
            // Stale reference (post removed by a reload); not an error
            tracing::debug!(link, to = %to, "Transition for unknown post ignored");
            return None;
        };
        let post = &mut self.posts[i];
        let from = post.status;

        if from == to {
            return None;
        }
        if !allowed_from.contains(&from) {
            tracing::debug!(link, from = %from, to = %to, "Transition not defined, ignored");
            return None;
        }

        post.status = to;
        Some(Transition {
            link: link.to_string(),
            from,
            to,
        })
    }
}
