use std::cmp::Reverse;

use itertools::Itertools;
use serde::Serialize;

use crate::model::{Place, PlaceId, PollSnapshot};
use crate::util::votes_label;

/// Who is ahead, if anyone.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Leadership {
    /// Empty poll, or nobody has a vote yet.
    NoLeader,
    Tie {
        places: usize,
        votes: u64,
    },
    Leader {
        place_id: PlaceId,
        name: String,
        votes: u64,
        /// Lead over second place; `None` when there is no second place.
        margin: Option<u64>,
    },
}

impl Leadership {
    fn of(ranked: &[Place]) -> Leadership {
        let top_votes = match ranked.first() {
            Some(first) if first.vote_count > 0 => first.vote_count,
            _ => return Leadership::NoLeader,
        };

        let tied = ranked.iter().take_while(|p| p.vote_count == top_votes).count();
        if tied > 1 {
            return Leadership::Tie { places: tied, votes: top_votes };
        }

        let leader = &ranked[0];
        let margin = ranked
            .get(1)
            .map(|second| top_votes - second.vote_count)
            .filter(|m| *m > 0);

        Leadership::Leader {
            place_id: leader.id.clone(),
            name: leader.name.clone(),
            votes: top_votes,
            margin,
        }
    }

    pub fn headline(&self) -> Option<String> {
        match self {
            Leadership::NoLeader => None,
            Leadership::Tie { places, .. } => Some(format!("{}-Way Tie!", places)),
            Leadership::Leader { name, .. } => Some(name.clone()),
        }
    }

    pub fn stats(&self) -> Option<String> {
        match self {
            Leadership::NoLeader => None,
            Leadership::Tie { places, votes } => Some(format!("{} places tied with {} each", places, votes_label(*votes))),
            Leadership::Leader { votes, margin, .. } => {
                let mut stats = votes_label(*votes);
                if let Some(margin) = margin {
                    stats.push_str(&format!(" • Leading by {}", votes_label(*margin)));
                }
                Some(stats)
            }
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RankedView {
    pub places: Vec<Place>,
    pub leadership: Leadership,
}

impl Default for RankedView {
    fn default() -> Self {
        RankedView {
            places: Vec::new(),
            leadership: Leadership::NoLeader,
        }
    }
}

impl RankedView {
    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.places.iter().position(|p| p.id == id)
    }
}

/// Orders places by votes, newest first among equals. Ids settle anything
/// left so the order never depends on map iteration.
pub fn compute_ranked_view(snapshot: &PollSnapshot) -> RankedView {
    let places: Vec<Place> = snapshot
        .places()
        .cloned()
        .sorted_by_key(|p| (Reverse(p.vote_count), Reverse(p.created_at), p.id.clone()))
        .collect();
    let leadership = Leadership::of(&places);
    RankedView { places, leadership }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, name: &str, votes: u64, created_at: i64) -> Place {
        Place {
            id: id.to_owned(),
            name: name.to_owned(),
            vote_count: votes,
            created_at,
            last_voted_at: None,
        }
    }

    fn ids(view: &RankedView) -> Vec<&str> {
        view.places.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn empty_poll_has_no_leader() {
        let view = compute_ranked_view(&PollSnapshot::default());
        assert!(view.is_empty());
        assert_eq!(view.leadership, Leadership::NoLeader);
        assert_eq!(view.leadership.headline(), None);
    }

    #[test]
    fn all_zero_has_no_leader() {
        let snapshot = PollSnapshot::from(vec![
            place("a", "Cafe", 0, 1),
            place("b", "Deli", 0, 2),
        ]);
        let view = compute_ranked_view(&snapshot);
        assert_eq!(view.leadership, Leadership::NoLeader);
        assert_eq!(ids(&view), vec!["b", "a"]);
    }

    #[test]
    fn equal_votes_sort_newest_first() {
        let snapshot = PollSnapshot::from(vec![
            place("p1", "Cafe", 5, 100),
            place("p2", "Deli", 5, 200),
        ]);
        let view = compute_ranked_view(&snapshot);
        assert_eq!(ids(&view), vec!["p2", "p1"]);
        assert_eq!(view.leadership, Leadership::Tie { places: 2, votes: 5 });
        assert_eq!(view.leadership.headline().as_deref(), Some("2-Way Tie!"));
        assert_eq!(view.leadership.stats().as_deref(), Some("2 places tied with 5 votes each"));
    }

    #[test]
    fn two_way_tie_above_third() {
        let snapshot = PollSnapshot::from(vec![
            place("a", "Cafe", 5, 1),
            place("b", "Deli", 5, 2),
            place("c", "Taco", 3, 3),
        ]);
        let view = compute_ranked_view(&snapshot);
        assert_eq!(view.leadership, Leadership::Tie { places: 2, votes: 5 });
    }

    #[test]
    fn sole_leader_reports_margin() {
        let snapshot = PollSnapshot::from(vec![
            place("a", "Cafe", 3, 1),
            place("b", "Deli", 5, 2),
            place("c", "Taco", 3, 3),
        ]);
        let view = compute_ranked_view(&snapshot);
        assert_eq!(ids(&view), vec!["b", "c", "a"]);
        assert_eq!(
            view.leadership,
            Leadership::Leader {
                place_id: "b".to_owned(),
                name: "Deli".to_owned(),
                votes: 5,
                margin: Some(2),
            }
        );
        assert_eq!(view.leadership.stats().as_deref(), Some("5 votes • Leading by 2 votes"));
    }

    #[test]
    fn lone_place_has_no_margin() {
        let snapshot = PollSnapshot::from(vec![place("a", "Cafe", 1, 1)]);
        let view = compute_ranked_view(&snapshot);
        assert_eq!(view.leadership.stats().as_deref(), Some("1 vote"));
        match view.leadership {
            Leadership::Leader { margin, .. } => assert_eq!(margin, None),
            other => panic!("expected a leader, got {:?}", other),
        }
    }

    #[test]
    fn ranking_is_deterministic() {
        let snapshot = PollSnapshot::from(vec![
            place("a", "Cafe", 2, 7),
            place("b", "Deli", 2, 7),
            place("c", "Taco", 9, 1),
            place("d", "Pho", 0, 3),
        ]);
        let first = compute_ranked_view(&snapshot);
        for _ in 0..10 {
            assert_eq!(compute_ranked_view(&snapshot.clone()), first);
        }
        assert_eq!(ids(&first), vec!["c", "a", "b", "d"]);
    }
}
