//! Access control (spec.md §4.7). Read and write groups coincide in this
//! model, so both checks share one predicate.

use crate::types::{GroupMap, Principal, User, I};

/// `user == i.p`, or `i.p` is a group `user` belongs to.
pub fn can_access(user: User, i: &I, groupmap: &GroupMap) -> bool {
    match i.p() {
        Principal::User(uid) => user.id() == uid.0,
        Principal::Group(gid) => groupmap.get(&gid).map(|members| members.contains(&user)).unwrap_or(false),
    }
}

pub fn can_read(user: User, i: &I, groupmap: &GroupMap) -> bool {
    can_access(user, i, groupmap)
}

pub fn can_write(user: User, i: &I, groupmap: &GroupMap) -> bool {
    can_access(user, i, groupmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupId;

    #[test]
    fn owner_can_access_own_i() {
        let u = User::new(0);
        let i = I::allocated(Principal::user(0), 0);
        assert!(can_read(u, &i, &GroupMap::new()));
    }

    #[test]
    fn non_member_cannot_access_group_i() {
        let u = User::new(1);
        let mut groupmap = GroupMap::new();
        groupmap.insert(GroupId(0), vec![User::new(0)]);
        let i = I::allocated(Principal::group(0), 0);
        assert!(!can_write(u, &i, &groupmap));
    }

    #[test]
    fn member_can_access_group_i() {
        let u = User::new(1);
        let mut groupmap = GroupMap::new();
        groupmap.insert(GroupId(0), vec![User::new(0), User::new(1)]);
        let i = I::allocated(Principal::group(0), 0);
        assert!(can_write(u, &i, &groupmap));
    }
}
