//! Performance counters, printed when the machine halts.

#[derive(Default)]
pub struct Stats {
    pub user_ticks: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub console_chars_out: u64,
    pub console_chars_in: u64,
    pub page_faults: u64,
    pub syscalls: u64,
}

impl Stats {
    pub fn print(&self) {
        println!("Ticks: total {}, user {}", logger::logger_now(), self.user_ticks);
        println!("Disk I/O: reads {}, writes {}", self.disk_reads, self.disk_writes);
        println!(
            "Console I/O: chars read {}, chars written {}",
            self.console_chars_in, self.console_chars_out
        );
        println!("Paging: faults {}", self.page_faults);
        println!("System calls: {}", self.syscalls);
    }
}
