//! Duel negotiation and bookkeeping
//!
//! A duel goes through `NoRelation -> PendingRequest -> Countdown -> Fighting`
//! and back to `NoRelation`. Pending requests are keyed by target, so a player
//! holds at most one incoming challenge. Active duels are indexed under both
//! participants.
//!
//! Both collections sit behind one mutex. Every operation takes it once,
//! mutates, and releases it before any presentation call goes out, so an
//! observer never sees a duel under one participant and not the other.
//!
//! The pre-fight countdown is a list of `(duel, remaining steps, next due)`
//! entries advanced by the tick driver. A step whose duel has already ended is
//! dropped without a sound.

use crate::config::DuelConfig;
use crate::host::{Effects, PlayerDirectory};
use crate::registry::assets;
use log::{debug, info, warn};
use shared::{DuelNotice, DuelRejection, PlayerId, TitleCard, TitleTiming, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type DuelId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelPhase {
    Countdown,
    Fighting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDuelRequest {
    pub challenger: PlayerId,
    pub target: PlayerId,
    pub created_at: Timestamp,
}

impl PendingDuelRequest {
    pub fn is_expired(&self, now: Timestamp, timeout_ms: u64) -> bool {
        now.saturating_sub(self.created_at) > timeout_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveDuel {
    pub id: DuelId,
    pub participant_a: PlayerId,
    pub participant_b: PlayerId,
    pub started_at: Timestamp,
    pub phase: DuelPhase,
}

impl ActiveDuel {
    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        if player == self.participant_a {
            Some(self.participant_b)
        } else if player == self.participant_b {
            Some(self.participant_a)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [PlayerId; 2] {
        [self.participant_a, self.participant_b]
    }
}

/// How a duel came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelEnding {
    Decided { winner: PlayerId, loser: PlayerId },
    Abandoned { leaver: PlayerId, remaining: PlayerId },
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    duel: DuelId,
    remaining: u8,
    next_due: Timestamp,
}

/// Presentation work collected under the lock and emitted after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cue {
    Count(DuelId, [PlayerId; 2], u8),
    Fight(DuelId, [PlayerId; 2]),
}

#[derive(Default)]
struct DuelBook {
    pending: HashMap<PlayerId, PendingDuelRequest>,
    by_player: HashMap<PlayerId, DuelId>,
    duels: HashMap<DuelId, ActiveDuel>,
    countdowns: Vec<Countdown>,
    next_id: DuelId,
}

impl DuelBook {
    fn duel_of(&self, player: PlayerId) -> Option<&ActiveDuel> {
        self.by_player.get(&player).and_then(|id| self.duels.get(id))
    }

    fn in_duel(&self, player: PlayerId) -> bool {
        self.by_player.contains_key(&player)
    }

    fn open(&mut self, a: PlayerId, b: PlayerId, now: Timestamp) -> ActiveDuel {
        self.next_id += 1;
        let duel = ActiveDuel {
            id: self.next_id,
            participant_a: a,
            participant_b: b,
            started_at: now,
            phase: DuelPhase::Countdown,
        };
        self.duels.insert(duel.id, duel);
        self.by_player.insert(a, duel.id);
        self.by_player.insert(b, duel.id);
        self.debug_check();
        duel
    }

    /// Removes the duel under both participant keys.
    fn close(&mut self, id: DuelId) -> Option<ActiveDuel> {
        let duel = self.duels.remove(&id)?;
        for player in duel.participants() {
            let removed = self.by_player.remove(&player);
            debug_assert_eq!(removed, Some(id), "duel {} was not indexed under {}", id, player);
        }
        self.countdowns.retain(|countdown| countdown.duel != id);
        self.debug_check();
        Some(duel)
    }

    /// Removes the request for `target` only if it is still the one filed at
    /// `created_at`.
    fn remove_if_unchanged(&mut self, target: PlayerId, created_at: Timestamp) -> bool {
        match self.pending.get(&target) {
            Some(request) if request.created_at == created_at => {
                self.pending.remove(&target);
                true
            }
            _ => false,
        }
    }

    fn debug_check(&self) {
        if cfg!(debug_assertions) {
            for (player, id) in &self.by_player {
                let duel = self.duels.get(id);
                debug_assert!(duel.is_some(), "{} indexed to missing duel {}", player, id);
                if let Some(duel) = duel {
                    let opponent = duel.opponent_of(*player);
                    debug_assert!(opponent.is_some(), "{} is not part of duel {}", player, id);
                    if let Some(opponent) = opponent {
                        debug_assert_eq!(self.by_player.get(&opponent), Some(id));
                    }
                }
            }
            debug_assert_eq!(self.by_player.len(), self.duels.len() * 2);
        }
    }
}

pub struct DuelCoordinator {
    book: Mutex<DuelBook>,
    directory: Arc<dyn PlayerDirectory>,
    effects: Arc<dyn Effects>,
    config: DuelConfig,
}

impl DuelCoordinator {
    pub fn new(
        directory: Arc<dyn PlayerDirectory>,
        effects: Arc<dyn Effects>,
        config: DuelConfig,
    ) -> Self {
        Self {
            book: Mutex::new(DuelBook::default()),
            directory,
            effects,
            config,
        }
    }

    fn book(&self) -> MutexGuard<'_, DuelBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Files a challenge from `challenger` to `target`.
    pub fn request_duel(
        &self,
        challenger: PlayerId,
        target: PlayerId,
        now: Timestamp,
    ) -> Result<(), DuelRejection> {
        if challenger == target {
            return Err(DuelRejection::SelfTarget);
        }
        if !self.directory.is_online(target) {
            return Err(DuelRejection::TargetNotFound);
        }

        {
            let mut book = self.book();
            if book.in_duel(challenger) || book.in_duel(target) {
                return Err(DuelRejection::AlreadyInDuel);
            }
            if book.pending.contains_key(&target) {
                return Err(DuelRejection::AlreadyPending);
            }
            book.pending.insert(
                target,
                PendingDuelRequest {
                    challenger,
                    target,
                    created_at: now,
                },
            );
        }

        debug!("{} challenged {}", challenger, target);
        self.effects
            .notify(challenger, DuelNotice::ChallengeSent { target });
        self.effects
            .notify(target, DuelNotice::ChallengeReceived { challenger });
        self.effects
            .play_sound_to(target, assets::SOUND_CHALLENGE, 1.0, 1.2);
        Ok(())
    }

    /// Accepts the challenge pending for `target` and starts the countdown.
    ///
    /// The request is consumed whether or not acceptance succeeds. Expiry is
    /// checked here as well as in the sweep, so a late accept always fails.
    pub fn accept(&self, target: PlayerId, now: Timestamp) -> Result<ActiveDuel, DuelRejection> {
        let duel = {
            let mut book = self.book();
            let request = book
                .pending
                .remove(&target)
                .ok_or(DuelRejection::NoPendingRequest)?;

            if request.is_expired(now, self.config.request_timeout_ms) {
                return Err(DuelRejection::RequestExpired);
            }
            if !self.directory.is_online(request.challenger) {
                drop(book);
                self.on_disconnect(request.challenger);
                return Err(DuelRejection::ChallengerOffline);
            }
            // The challenger may have accepted someone else in the meantime
            if book.in_duel(request.challenger) || book.in_duel(target) {
                return Err(DuelRejection::AlreadyInDuel);
            }

            let duel = book.open(request.challenger, target, now);
            book.countdowns.push(Countdown {
                duel: duel.id,
                remaining: self.config.countdown_steps,
                next_due: now + self.config.countdown_step_ms,
            });
            duel
        };

        info!(
            "Duel {} started between {} and {}",
            duel.id, duel.participant_a, duel.participant_b
        );
        Ok(duel)
    }

    /// Refuses the challenge pending for `target`. Returns the challenger.
    pub fn decline(&self, target: PlayerId) -> Result<PlayerId, DuelRejection> {
        let request = self
            .book()
            .pending
            .remove(&target)
            .ok_or(DuelRejection::NoPendingRequest)?;

        debug!("{} declined {}", target, request.challenger);
        self.effects.notify(
            target,
            DuelNotice::DeclineConfirmed {
                challenger: request.challenger,
            },
        );
        if self.directory.is_online(request.challenger) {
            self.effects
                .notify(request.challenger, DuelNotice::Declined { by: target });
        }
        Ok(request.challenger)
    }

    /// Ends the duel between `winner` and `loser`. Returns false when they are
    /// not opponents in a live duel.
    pub fn end_duel(&self, winner: PlayerId, loser: PlayerId) -> bool {
        let closed = {
            let mut book = self.book();
            match book.duel_of(winner).copied() {
                Some(duel) if duel.opponent_of(winner) == Some(loser) => book.close(duel.id),
                _ => None,
            }
        };

        let Some(duel) = closed else {
            warn!("end_duel({}, {}) with no shared duel", winner, loser);
            return false;
        };

        info!("Duel {} won by {} over {}", duel.id, winner, loser);
        self.effects
            .show_title(winner, TitleCard::Victory, TitleTiming::RESULT);
        self.effects
            .show_title(loser, TitleCard::Defeat { winner }, TitleTiming::RESULT);
        self.effects
            .play_sound_to(winner, assets::SOUND_VICTORY, 1.0, 1.0);
        true
    }

    /// Cleans up after a player leaves the server.
    ///
    /// Drops the request aimed at them and every request they sent. A duel they
    /// were in ends with no winner and the opponent is told why.
    pub fn on_disconnect(&self, player: PlayerId) -> Option<DuelEnding> {
        let abandoned = {
            let mut book = self.book();
            book.pending.remove(&player);
            book.pending
                .retain(|_, request| request.challenger != player);

            let id = book.by_player.get(&player).copied();
            id.and_then(|id| book.close(id))
        };

        let duel = abandoned?;
        let remaining = duel.opponent_of(player)?;
        info!("Duel {} abandoned by {}", duel.id, player);
        if self.directory.is_online(remaining) {
            self.effects.notify(
                remaining,
                DuelNotice::OpponentDisconnected { opponent: player },
            );
        }
        Some(DuelEnding::Abandoned {
            leaver: player,
            remaining,
        })
    }

    /// A participant died: the opponent wins. Pending requests are left alone.
    pub fn on_death(&self, player: PlayerId) -> Option<DuelEnding> {
        let opponent = self.opponent_of(player)?;
        self.end_duel(opponent, player).then_some(DuelEnding::Decided {
            winner: opponent,
            loser: player,
        })
    }

    /// Clears everything without notifying anyone. Shutdown only.
    pub fn end_all(&self) {
        let mut book = self.book();
        let duels = book.duels.len();
        let pending = book.pending.len();
        *book = DuelBook::default();
        info!("Cleared {} duels and {} pending requests", duels, pending);
    }

    /// Removes every request older than the timeout. Active duels are untouched.
    ///
    /// Candidates are collected first and then removed one by one, each only
    /// if the entry still carries the timestamp seen during the scan. A newer
    /// request filed for the same target in between survives.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let expired: Vec<(PlayerId, Timestamp)> = self
            .book()
            .pending
            .values()
            .filter(|request| request.is_expired(now, self.config.request_timeout_ms))
            .map(|request| (request.target, request.created_at))
            .collect();

        let removed = expired
            .into_iter()
            .filter(|(target, created_at)| self.book().remove_if_unchanged(*target, *created_at))
            .count();

        if removed > 0 {
            debug!("Swept {} expired duel requests", removed);
        }
        removed
    }

    /// Fires due countdown steps. Called from the tick driver.
    pub fn advance_countdowns(&self, now: Timestamp) -> usize {
        let cues = {
            let mut guard = self.book();
            let book = &mut *guard;
            let mut cues = Vec::new();
            let step_ms = self.config.countdown_step_ms;

            book.countdowns.retain_mut(|countdown| {
                if countdown.next_due > now {
                    return true;
                }
                let Some(duel) = book.duels.get_mut(&countdown.duel) else {
                    return false;
                };
                if countdown.remaining > 0 {
                    cues.push(Cue::Count(duel.id, duel.participants(), countdown.remaining));
                    countdown.remaining -= 1;
                    countdown.next_due += step_ms;
                    true
                } else {
                    duel.phase = DuelPhase::Fighting;
                    cues.push(Cue::Fight(duel.id, duel.participants()));
                    false
                }
            });

            cues
        };

        for cue in &cues {
            self.present(*cue);
        }
        cues.len()
    }

    fn present(&self, cue: Cue) {
        match cue {
            Cue::Count(id, players, number) => {
                debug!("Duel {} countdown {}", id, number);
                for player in players {
                    self.effects.show_title(
                        player,
                        TitleCard::Countdown(number),
                        TitleTiming::COUNTDOWN,
                    );
                    self.effects
                        .play_sound_to(player, assets::SOUND_COUNTDOWN, 0.8, 1.0);
                }
            }
            Cue::Fight(id, players) => {
                debug!("Duel {} fight", id);
                for player in players {
                    self.effects
                        .show_title(player, TitleCard::Fight, TitleTiming::FIGHT);
                    self.effects
                        .play_sound_to(player, assets::SOUND_FIGHT, 1.0, 1.0);
                }
            }
        }
    }

    pub fn is_in_duel(&self, player: PlayerId) -> bool {
        self.book().in_duel(player)
    }

    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        self.book()
            .duel_of(player)
            .and_then(|duel| duel.opponent_of(player))
    }

    pub fn duel_of(&self, player: PlayerId) -> Option<ActiveDuel> {
        self.book().duel_of(player).copied()
    }

    pub fn pending_for(&self, target: PlayerId) -> Option<PendingDuelRequest> {
        self.book().pending.get(&target).copied()
    }

    /// Everyone the coordinator currently holds state for
    pub fn known_players(&self) -> Vec<PlayerId> {
        let book = self.book();
        let mut players: Vec<PlayerId> = book.by_player.keys().copied().collect();
        for request in book.pending.values() {
            players.push(request.challenger);
            players.push(request.target);
        }
        players.sort();
        players.dedup();
        players
    }

    pub fn pending_count(&self) -> usize {
        self.book().pending.len()
    }

    pub fn duel_count(&self) -> usize {
        self.book().duels.len()
    }
}
