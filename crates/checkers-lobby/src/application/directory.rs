//! Directory: who is connected, under which nickname, reachable by which code.
//!
//! The directory owns two bidirectional unique maps and the active-identity
//! set:
//!
//! ```text
//! nickname    <-> ConnId
//! InviteCode  <-> ConnId
//! nickname     -> PlayerIdentity   (the active set)
//! ```
//!
//! # Why bidirectional maps? (for beginners)
//!
//! The lobby needs both directions constantly: an `inviteAsk` names a code
//! and must find the target connection, then it needs the *asker's* own
//! nickname and code, which it finds from the asker's connection.  Two plain
//! `HashMap`s would work, but every insert and remove would have to remember
//! to touch both.  [`BiMap`] makes that impossible to forget: the only way to
//! change it updates both directions at once.
//!
//! The directory has a single writer, the lobby task, so it needs no locking.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use checkers_core::{InviteCode, PlayerIdentity};
use thiserror::Error;

/// Registration key of a lobby connection.
///
/// It plays the role of a poll token: it names "this registration" and nothing
/// more.  Keys are never reused within one lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Error type for directory mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The nickname is registered by another connection.
    #[error("nickname `{nickname}` is already registered by {owner}")]
    NicknameTaken { nickname: String, owner: ConnId },
}

// ── BiMap ─────────────────────────────────────────────────────────────────────

/// A 1:1 map that can be queried from either side.
///
/// Inserting a pair evicts any existing pairing of either value first, so the
/// invariant "each left maps to exactly one right and vice versa" holds after
/// every call.
#[derive(Debug, Clone)]
pub struct BiMap<L, R> {
    forward: HashMap<L, R>,
    reverse: HashMap<R, L>,
}

impl<L, R> Default for BiMap<L, R> {
    fn default() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }
}

impl<L, R> BiMap<L, R>
where
    L: Eq + Hash + Clone,
    R: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs `left` with `right`, dropping whatever either was paired with.
    pub fn insert(&mut self, left: L, right: R) {
        self.remove_by_left(&left);
        self.remove_by_right(&right);
        self.forward.insert(left.clone(), right.clone());
        self.reverse.insert(right, left);
    }

    pub fn get_by_left(&self, left: &L) -> Option<&R> {
        self.forward.get(left)
    }

    pub fn get_by_right(&self, right: &R) -> Option<&L> {
        self.reverse.get(right)
    }

    pub fn contains_left(&self, left: &L) -> bool {
        self.forward.contains_key(left)
    }

    pub fn contains_right(&self, right: &R) -> bool {
        self.reverse.contains_key(right)
    }

    /// Removes the pair containing `left`, returning its right side.
    pub fn remove_by_left(&mut self, left: &L) -> Option<R> {
        let right = self.forward.remove(left)?;
        self.reverse.remove(&right);
        Some(right)
    }

    /// Removes the pair containing `right`, returning its left side.
    pub fn remove_by_right(&mut self, right: &R) -> Option<L> {
        let left = self.reverse.remove(right)?;
        self.forward.remove(&left);
        Some(left)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&L, &R)> {
        self.forward.iter()
    }
}

// ── Directory ─────────────────────────────────────────────────────────────────

/// Nickname and invite-code registry of every lobby connection.
#[derive(Debug, Default)]
pub struct Directory {
    nicknames: BiMap<String, ConnId>,
    codes: BiMap<InviteCode, ConnId>,
    players: HashMap<String, PlayerIdentity>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `identity` for `conn`.
    ///
    /// A connection that registers again replaces its previous nickname and
    /// identity record.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NicknameTaken`] if another connection holds
    /// the nickname; nothing is changed in that case.
    pub fn register_identity(
        &mut self,
        conn: ConnId,
        identity: PlayerIdentity,
    ) -> Result<(), DirectoryError> {
        if let Some(&owner) = self.nicknames.get_by_left(&identity.nickname) {
            if owner != conn {
                return Err(DirectoryError::NicknameTaken {
                    nickname: identity.nickname,
                    owner,
                });
            }
        }

        if let Some(previous) = self.nicknames.remove_by_right(&conn) {
            self.players.remove(&previous);
        }
        self.nicknames.insert(identity.nickname.clone(), conn);
        self.players.insert(identity.nickname.clone(), identity);
        Ok(())
    }

    /// Returns the invite code of `conn`, issuing a fresh unique one the first
    /// time it is asked for.
    pub fn issue_code(&mut self, conn: ConnId) -> InviteCode {
        if let Some(code) = self.codes.get_by_right(&conn) {
            return code.clone();
        }
        let code = InviteCode::generate_unique(|candidate| self.codes.contains_left(candidate));
        self.codes.insert(code.clone(), conn);
        code
    }

    pub fn nickname_of(&self, conn: ConnId) -> Option<&str> {
        self.nicknames.get_by_right(&conn).map(String::as_str)
    }

    pub fn identity_of(&self, conn: ConnId) -> Option<&PlayerIdentity> {
        self.nickname_of(conn).and_then(|nick| self.players.get(nick))
    }

    pub fn code_of(&self, conn: ConnId) -> Option<&InviteCode> {
        self.codes.get_by_right(&conn)
    }

    pub fn owner_of_code(&self, code: &InviteCode) -> Option<ConnId> {
        self.codes.get_by_left(code).copied()
    }

    pub fn owner_of_nickname(&self, nickname: &str) -> Option<ConnId> {
        self.nicknames.get_by_left(&nickname.to_string()).copied()
    }

    /// Removes every entry belonging to `conn`: nickname mapping, identity
    /// record, and invite code.  Returns the removed identity, if any.
    pub fn remove_connection(&mut self, conn: ConnId) -> Option<PlayerIdentity> {
        self.codes.remove_by_right(&conn);
        let nickname = self.nicknames.remove_by_right(&conn)?;
        self.players.remove(&nickname)
    }

    /// Every active identity, in no particular order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerIdentity> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn nickname_count(&self) -> usize {
        self.nicknames.len()
    }

    pub fn code_count(&self) -> usize {
        self.codes.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn player(nick: &str) -> PlayerIdentity {
        PlayerIdentity::new(nick, "aW1n")
    }

    #[test]
    fn test_bimap_insert_is_visible_from_both_sides() {
        let mut map = BiMap::new();
        map.insert("alice".to_string(), ConnId(1));

        assert_eq!(map.get_by_left(&"alice".to_string()), Some(&ConnId(1)));
        assert_eq!(map.get_by_right(&ConnId(1)), Some(&"alice".to_string()));
    }

    #[test]
    fn test_bimap_insert_evicts_existing_pairings() {
        // Arrange
        let mut map = BiMap::new();
        map.insert("alice".to_string(), ConnId(1));
        map.insert("bob".to_string(), ConnId(2));

        // Act: pair alice with bob's connection.
        map.insert("alice".to_string(), ConnId(2));

        // Assert: both old pairs are gone, only the new one remains.
        assert_eq!(map.len(), 1);
        assert!(!map.contains_right(&ConnId(1)));
        assert!(!map.contains_left(&"bob".to_string()));
        assert_eq!(map.get_by_right(&ConnId(2)), Some(&"alice".to_string()));
    }

    #[test]
    fn test_bimap_remove_clears_both_directions() {
        let mut map = BiMap::new();
        map.insert("alice".to_string(), ConnId(1));

        assert_eq!(map.remove_by_right(&ConnId(1)), Some("alice".to_string()));
        assert!(map.is_empty());
        assert!(map.get_by_left(&"alice".to_string()).is_none());
        assert_eq!(map.remove_by_left(&"alice".to_string()), None);
    }

    #[test]
    fn test_register_identity_creates_one_mapping() {
        // Arrange
        let mut dir = Directory::new();

        // Act
        dir.register_identity(ConnId(1), player("YWxpY2U=")).unwrap();

        // Assert
        assert_eq!(dir.nickname_count(), 1);
        assert_eq!(dir.player_count(), 1);
        assert_eq!(dir.nickname_of(ConnId(1)), Some("YWxpY2U="));
        assert_eq!(dir.owner_of_nickname("YWxpY2U="), Some(ConnId(1)));
    }

    #[test]
    fn test_register_identity_refuses_nickname_of_other_connection() {
        let mut dir = Directory::new();
        dir.register_identity(ConnId(1), player("YWxpY2U=")).unwrap();

        let result = dir.register_identity(ConnId(2), player("YWxpY2U="));

        assert_eq!(
            result,
            Err(DirectoryError::NicknameTaken {
                nickname: "YWxpY2U=".to_string(),
                owner: ConnId(1),
            })
        );
        assert_eq!(dir.nickname_count(), 1);
        assert!(dir.nickname_of(ConnId(2)).is_none());
    }

    #[test]
    fn test_reregistration_replaces_previous_identity() {
        // Arrange
        let mut dir = Directory::new();
        dir.register_identity(ConnId(1), player("b2xk")).unwrap();

        // Act
        dir.register_identity(ConnId(1), player("bmV3")).unwrap();

        // Assert
        assert_eq!(dir.player_count(), 1);
        assert_eq!(dir.nickname_of(ConnId(1)), Some("bmV3"));
        assert!(dir.owner_of_nickname("b2xk").is_none());
    }

    #[test]
    fn test_issue_code_is_stable_per_connection() {
        let mut dir = Directory::new();
        let first = dir.issue_code(ConnId(1));
        let second = dir.issue_code(ConnId(1));

        assert_eq!(first, second);
        assert_eq!(dir.code_count(), 1);
        assert_eq!(dir.owner_of_code(&first), Some(ConnId(1)));
    }

    #[test]
    fn test_issued_codes_are_unique_and_twelve_characters() {
        let mut dir = Directory::new();
        let codes: HashSet<InviteCode> = (0..200).map(|i| dir.issue_code(ConnId(i))).collect();

        assert_eq!(codes.len(), 200);
        assert!(codes.iter().all(|c| c.as_str().len() == 12));
        assert_eq!(dir.code_count(), 200);
    }

    #[test]
    fn test_remove_connection_clears_every_entry() {
        // Arrange
        let mut dir = Directory::new();
        dir.register_identity(ConnId(1), player("YWxpY2U=")).unwrap();
        let code = dir.issue_code(ConnId(1));
        dir.register_identity(ConnId(2), player("Ym9i")).unwrap();

        // Act
        let removed = dir.remove_connection(ConnId(1));

        // Assert
        assert_eq!(removed, Some(player("YWxpY2U=")));
        assert!(dir.owner_of_code(&code).is_none());
        assert!(dir.nickname_of(ConnId(1)).is_none());
        assert_eq!(dir.player_count(), 1);
        assert_eq!(dir.nickname_of(ConnId(2)), Some("Ym9i"));
    }

    #[test]
    fn test_remove_connection_without_identity_still_drops_code() {
        let mut dir = Directory::new();
        let code = dir.issue_code(ConnId(7));

        assert_eq!(dir.remove_connection(ConnId(7)), None);
        assert!(dir.owner_of_code(&code).is_none());
    }

    #[test]
    fn test_conn_id_display() {
        assert_eq!(ConnId(42).to_string(), "conn#42");
    }
}
