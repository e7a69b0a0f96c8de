use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MIN_PLAYERS: usize = 2;
/// Candidate words offered to the drawer each round.
pub const WORD_CHOICES: usize = 3;
/// Points awarded for the first correct guess of a round.
pub const GUESS_REWARD: u32 = 10;

/// Seconds the drawer has to pick a word before the fallback kicks in.
pub const SELECTION_SECS: u64 = 10;
/// Seconds of guessing time per round.
pub const GUESSING_SECS: u64 = 120;
/// Seconds between the final scoreboard and room teardown.
pub const TEARDOWN_SECS: u64 = 30;

// -- Room Phase Machine --

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoomPhase {
    Lobby,
    WordSelection,
    Guessing,
    RoundEnd,
    GameEnd,
    Closed,
}

/// Per-room game state: membership, drawer rotation, scores.
///
/// Pure data and transitions; timers and broadcasting live in the server.
/// All mutation goes through methods so the invariants hold: member names
/// are unique, `points` keys are exactly the current members, and
/// `current_drawer` (when set) is a member.
#[derive(Debug, Clone)]
pub struct GameState {
    pub phase: RoomPhase,
    /// Display names in join order.
    pub members: Vec<String>,
    pub points: HashMap<String, u32>,
    /// Everyone who has held the drawer role this game, including members
    /// who later left. That keeps the rotation finite.
    pub has_drawn: HashSet<String>,
    pub current_drawer: Option<String>,
    pub current_word: Option<String>,
    pub word_choices: Vec<String>,
}

/// What a member's departure means for the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub was_member: bool,
    pub was_drawer: bool,
    pub now_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    /// First correct guess of the round; the round is now in `RoundEnd`.
    Correct { word: String },
    /// Wrong word, out-of-round guess, or the drawer guessing their own
    /// word. Still chat, never points.
    Miss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundConclusion {
    /// Every current member has drawn; the room is now in `GameEnd`.
    GameOver,
    /// At least one member has not drawn yet; start the next round.
    NextRound,
}

impl GameState {
    pub fn new(creator: &str) -> Self {
        Self {
            phase: RoomPhase::Lobby,
            members: vec![creator.to_string()],
            points: HashMap::from([(creator.to_string(), 0)]),
            has_drawn: HashSet::new(),
            current_drawer: None,
            current_word: None,
            word_choices: Vec::new(),
        }
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    pub fn is_drawer(&self, name: &str) -> bool {
        self.current_drawer.as_deref() == Some(name)
    }

    /// Add a member. Names are unique within the room, case-sensitive.
    pub fn add_member(&mut self, name: &str) -> Result<(), GameError> {
        if self.is_member(name) {
            return Err(GameError::NameTaken);
        }
        self.members.push(name.to_string());
        self.points.insert(name.to_string(), 0);
        Ok(())
    }

    /// Remove a member and their score entry. The name stays in
    /// `has_drawn` so the rotation still terminates.
    pub fn remove_member(&mut self, name: &str) -> Departure {
        let was_member = self.is_member(name);
        self.members.retain(|m| m != name);
        self.points.remove(name);
        let was_drawer = self.is_drawer(name);
        if was_drawer {
            self.current_drawer = None;
        }
        Departure {
            was_member,
            was_drawer,
            now_empty: self.members.is_empty(),
        }
    }

    pub fn can_start(&self) -> Result<(), GameError> {
        if self.phase != RoomPhase::Lobby {
            return Err(GameError::WrongPhase);
        }
        if self.members.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }
        Ok(())
    }

    /// Enter `WordSelection`: pick the next drawer uniformly at random among
    /// members who have not drawn yet, mark them drawn, and record the
    /// offered words.
    pub fn begin_round(
        &mut self,
        choices: Vec<String>,
        rng: &mut impl Rng,
    ) -> Result<String, GameError> {
        if !matches!(self.phase, RoomPhase::Lobby | RoomPhase::RoundEnd) {
            return Err(GameError::WrongPhase);
        }
        let candidates: Vec<&String> = self
            .members
            .iter()
            .filter(|m| !self.has_drawn.contains(*m))
            .collect();
        let drawer = candidates
            .choose(rng)
            .ok_or(GameError::NoUndrawnMembers)?
            .to_string();
        self.has_drawn.insert(drawer.clone());
        self.current_drawer = Some(drawer.clone());
        self.current_word = None;
        self.word_choices = choices;
        self.phase = RoomPhase::WordSelection;
        Ok(drawer)
    }

    /// The drawer picked one of the offered words; enter `Guessing`.
    pub fn choose_word(&mut self, name: &str, word: &str) -> Result<String, GameError> {
        if self.phase != RoomPhase::WordSelection {
            return Err(GameError::WrongPhase);
        }
        if !self.is_drawer(name) {
            return Err(GameError::NotYourTurn);
        }
        if !self.word_choices.iter().any(|w| w == word) {
            return Err(GameError::WordNotOffered);
        }
        self.current_word = Some(word.to_string());
        self.phase = RoomPhase::Guessing;
        Ok(word.to_string())
    }

    /// Selection timer expired: the first offered word is the word. The
    /// fallback is deterministic, not a fresh random pick.
    pub fn choose_fallback_word(&mut self) -> Result<String, GameError> {
        if self.phase != RoomPhase::WordSelection {
            return Err(GameError::WrongPhase);
        }
        let word = self
            .word_choices
            .first()
            .cloned()
            .ok_or(GameError::WrongPhase)?;
        self.current_word = Some(word.clone());
        self.phase = RoomPhase::Guessing;
        Ok(word)
    }

    /// Score a guess. Matching is case-insensitive on the trimmed text.
    /// A correct guess awards [`GUESS_REWARD`] and moves the room to
    /// `RoundEnd` immediately; everything else is a miss.
    pub fn evaluate_guess(&mut self, name: &str, text: &str) -> GuessOutcome {
        if self.phase != RoomPhase::Guessing || !self.is_member(name) || self.is_drawer(name) {
            return GuessOutcome::Miss;
        }
        let Some(word) = self.current_word.clone() else {
            return GuessOutcome::Miss;
        };
        if normalize(text) != normalize(&word) {
            return GuessOutcome::Miss;
        }
        if let Some(score) = self.points.get_mut(name) {
            *score += GUESS_REWARD;
        }
        self.phase = RoomPhase::RoundEnd;
        GuessOutcome::Correct { word }
    }

    /// Guessing timer expired (or the drawer left) without a correct guess.
    pub fn end_round(&mut self) -> Result<(), GameError> {
        if !matches!(self.phase, RoomPhase::WordSelection | RoomPhase::Guessing) {
            return Err(GameError::WrongPhase);
        }
        self.phase = RoomPhase::RoundEnd;
        Ok(())
    }

    pub fn all_members_have_drawn(&self) -> bool {
        self.members.iter().all(|m| self.has_drawn.contains(m))
    }

    /// Leave `RoundEnd`: either the rotation is exhausted (`GameEnd`) or the
    /// next round should begin. The word is cleared either way.
    pub fn conclude_round(&mut self) -> Result<RoundConclusion, GameError> {
        if self.phase != RoomPhase::RoundEnd {
            return Err(GameError::WrongPhase);
        }
        self.current_word = None;
        self.word_choices.clear();
        if self.all_members_have_drawn() {
            self.phase = RoomPhase::GameEnd;
            Ok(RoundConclusion::GameOver)
        } else {
            Ok(RoundConclusion::NextRound)
        }
    }

    pub fn close(&mut self) {
        self.phase = RoomPhase::Closed;
    }

    /// Final scoreboard, highest score first, ties in join order.
    pub fn scores(&self) -> Vec<(String, u32)> {
        let mut scores: Vec<(String, u32)> = self
            .members
            .iter()
            .map(|m| (m.clone(), self.points.get(m).copied().unwrap_or(0)))
            .collect();
        scores.sort_by(|a, b| b.1.cmp(&a.1));
        scores
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

// -- Errors --

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("display name already taken in this room")]
    NameTaken,
    #[error("need at least {MIN_PLAYERS} players to start")]
    NotEnoughPlayers,
    #[error("only the current drawer can do that")]
    NotYourTurn,
    #[error("that word was not offered this round")]
    WordNotOffered,
    #[error("action does not apply in the current phase")]
    WrongPhase,
    #[error("no undrawn members left in the rotation")]
    NoUndrawnMembers,
}
