use crate::steps;

pub fn run() {
    let cluster = steps::cluster::start_cluster(3);

    let leader = cluster.wait_for_leader();

    // renewals keep the same leader in place
    cluster.assert_single_leader_for(2000);
    assert_eq!(cluster.leaders(), vec![leader.name().to_string()]);

    for server in &cluster.servers {
        assert_eq!(server.leader_addr().expect("store reachable"), Some(leader.addr()));
    }
    assert_eq!(leader.verify_leadership(), Ok(true));

    cluster.terminate();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_single_leader() {
        crate::cases::single_leader::run()
    }
}
