use crate::steps;

pub fn run() {
    let mut cluster = steps::cluster::start_cluster(3);

    let old_leader = cluster.wait_for_leader();
    let old_name = old_leader.name().to_string();

    cluster.close_server(&old_name);
    assert!(!old_leader.is_leader());

    let new_leader = cluster.wait_for_leader_except(&[&old_name], steps::failover_timeout());
    assert_ne!(new_leader.name(), old_name);
    cluster.assert_single_leader_for(1000);

    cluster.terminate();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_failover() {
        crate::cases::failover::run()
    }
}
