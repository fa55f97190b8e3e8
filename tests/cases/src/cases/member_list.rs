use rand::Rng;

use crate::steps;

fn check_member_list(count: u32) {
    let cluster = steps::cluster::start_cluster(count);
    cluster.wait_for_leader();

    let someone = rand::thread_rng().gen_range(0..cluster.servers.len());
    let names = steps::http::list_member_names(&cluster.servers[someone]);

    let expected: Vec<String> = cluster
        .servers
        .iter()
        .map(|server| server.name().to_string())
        .collect();
    assert_eq!(names, expected);

    cluster.terminate();
}

pub fn run() {
    check_member_list(1);
    check_member_list(3);
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_member_list() {
        crate::cases::member_list::run()
    }
}
