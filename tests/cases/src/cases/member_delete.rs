use axum::http::StatusCode;
use rand::Rng;

use crate::steps;

pub fn run() {
    let cluster = steps::cluster::start_cluster(3);
    cluster.wait_for_leader();

    let mut rng = rand::thread_rng();
    let unknown = format!("node{}", u64::from(rng.gen::<u32>()) + 1000);
    let any = &cluster.servers[rng.gen_range(0..3)];
    assert_eq!(steps::http::delete_member(any, &unknown), StatusCode::NOT_FOUND);

    let someone = cluster.servers[rng.gen_range(0..3)].name().to_string();
    let caller = cluster
        .servers
        .iter()
        .find(|server| server.name() != someone)
        .expect("another server")
        .clone();

    assert_eq!(steps::http::delete_member(&caller, &someone), StatusCode::OK);
    assert_eq!(steps::http::delete_member(&caller, &someone), StatusCode::NOT_FOUND);
    assert_eq!(steps::http::delete_member(&caller, &unknown), StatusCode::NOT_FOUND);

    let names = steps::http::list_member_names(&caller);
    assert_eq!(names.len(), 2);
    assert!(!names.contains(&someone));

    cluster.terminate();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_member_delete() {
        crate::cases::member_delete::run()
    }
}
