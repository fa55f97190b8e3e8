use axum::http::StatusCode;

use crate::steps;

pub fn run() {
    let cluster = steps::cluster::start_cluster(3);

    let leader = cluster.wait_for_leader();
    let leader_name = leader.name().to_string();
    let follower = cluster
        .servers
        .iter()
        .find(|server| server.name() != leader_name)
        .expect("a follower")
        .clone();

    assert_eq!(steps::http::delete_member(&follower, &leader_name), StatusCode::OK);

    // the removed leader steps down and stops on its own
    assert!(steps::wait_until(steps::failover_timeout(), || cluster.is_stopped(&leader_name)));
    assert!(!leader.is_leader());

    let new_leader = cluster.wait_for_leader_except(&[&leader_name], steps::failover_timeout());
    assert_eq!(steps::http::list_member_names(&new_leader).len(), 2);

    cluster.terminate();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_removed_leader() {
        crate::cases::removed_leader::run()
    }
}
