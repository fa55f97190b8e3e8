#[macro_use]
extern crate log;


use chrono::prelude::{DateTime, Local};
use std::io::Write;

fn init_logger() {
    env_logger::builder()
        .format(|buf, record| {
            let now: DateTime<Local> = Local::now();
            let now_str = now.format("%H:%M:%S.%3f").to_string();
            writeln!(buf, "{:5}: {} - {}", record.level(), now_str, record.args())
        })
        .init();
}

fn main() {
    init_logger();

    cases::single_leader::run();
    cases::failover::run();
    cases::crashed_leader::run();
    cases::member_list::run();
    cases::member_delete::run();
    cases::removed_leader::run();

    info!("All cases passed");
}
