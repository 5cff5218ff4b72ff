//! Presence and room membership against simple set models

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

use failfixes_chat::backend::realtime::{ConnectionId, PresenceTracker, RoomMembershipManager};

#[derive(Debug, Clone)]
enum PresenceOp {
    Connect(usize, u64),
    Disconnect(usize, u64),
}

fn presence_op() -> impl Strategy<Value = PresenceOp> {
    prop_oneof![
        (0..3usize, 1..6u64).prop_map(|(u, c)| PresenceOp::Connect(u, c)),
        (0..3usize, 1..6u64).prop_map(|(u, c)| PresenceOp::Disconnect(u, c)),
    ]
}

#[derive(Debug, Clone)]
enum RoomOp {
    Join(u64, usize),
    Leave(u64, usize),
    LeaveAll(u64),
}

fn room_op() -> impl Strategy<Value = RoomOp> {
    prop_oneof![
        (1..5u64, 0..4usize).prop_map(|(c, r)| RoomOp::Join(c, r)),
        (1..5u64, 0..4usize).prop_map(|(c, r)| RoomOp::Leave(c, r)),
        (1..5u64).prop_map(RoomOp::LeaveAll),
    ]
}

proptest! {
    #[test]
    fn prop_presence_matches_model(ops in prop::collection::vec(presence_op(), 1..60)) {
        let users: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let tracker = PresenceTracker::new();
        let mut model: HashMap<usize, HashSet<u64>> = HashMap::new();

        for op in ops {
            match op {
                PresenceOp::Connect(u, c) => {
                    let set = model.entry(u).or_default();
                    let expected = set.is_empty();
                    set.insert(c);
                    prop_assert_eq!(tracker.connect(users[u], ConnectionId::new(c)), expected);
                }
                PresenceOp::Disconnect(u, c) => {
                    let set = model.entry(u).or_default();
                    let expected = set.remove(&c) && set.is_empty();
                    prop_assert_eq!(tracker.disconnect(users[u], ConnectionId::new(c)), expected);
                }
            }

            for (u, user_id) in users.iter().enumerate() {
                let online = model.get(&u).is_some_and(|set| !set.is_empty());
                prop_assert_eq!(tracker.is_online(*user_id), online);
            }
        }

        let expected: BTreeSet<Uuid> = model
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(u, _)| users[*u])
            .collect();
        prop_assert_eq!(tracker.online_users(), expected);
    }

    #[test]
    fn prop_rooms_match_model(ops in prop::collection::vec(room_op(), 1..60)) {
        let chats: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let rooms = RoomMembershipManager::new();
        let mut model: HashSet<(u64, usize)> = HashSet::new();

        for op in ops {
            match op {
                RoomOp::Join(c, r) => {
                    let expected = model.insert((c, r));
                    prop_assert_eq!(rooms.join(ConnectionId::new(c), chats[r]), expected);
                }
                RoomOp::Leave(c, r) => {
                    let expected = model.remove(&(c, r));
                    prop_assert_eq!(rooms.leave(ConnectionId::new(c), chats[r]), expected);
                }
                RoomOp::LeaveAll(c) => {
                    let expected: BTreeSet<Uuid> = model
                        .iter()
                        .filter(|(conn, _)| *conn == c)
                        .map(|(_, r)| chats[*r])
                        .collect();
                    model.retain(|(conn, _)| *conn != c);
                    prop_assert_eq!(rooms.leave_all(ConnectionId::new(c)), expected);
                }
            }
        }

        // both indexes agree with the model
        for (r, chat_id) in chats.iter().enumerate() {
            let expected: HashSet<ConnectionId> = model
                .iter()
                .filter(|(_, room)| *room == r)
                .map(|(c, _)| ConnectionId::new(*c))
                .collect();
            prop_assert_eq!(rooms.members_of(*chat_id), expected);
        }
        for c in 1..5u64 {
            let expected: BTreeSet<Uuid> = model
                .iter()
                .filter(|(conn, _)| *conn == c)
                .map(|(_, r)| chats[*r])
                .collect();
            prop_assert_eq!(rooms.rooms_of(ConnectionId::new(c)), expected);
        }
    }
}
