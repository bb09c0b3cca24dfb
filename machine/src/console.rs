//! Character console device.
//!
//! Output goes to the host's stdout (or a capture buffer under test);
//! input comes from a buffer fed in before the run. Both directions
//! complete through interrupts, one character at a time, so the kernel
//! wraps the device in its own synchronous layer.

use std::collections::VecDeque;
use std::io::Write;

// 每个字符的模拟时延
const CONSOLE_TICKS: u64 = 10;

enum Sink {
    Stdout,
    Capture(Vec<u8>),
}

pub struct Console {
    sink: Sink,
    source: VecDeque<u8>,
    // 取到的输入字符停在这里等内核收走; None 表示输入已经结束
    incoming: Option<u8>,
    put_busy: bool,
    write_handler: Option<fn()>,
    read_handler: Option<fn()>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            sink: Sink::Stdout,
            source: VecDeque::new(),
            incoming: None,
            put_busy: false,
            write_handler: None,
            read_handler: None,
        }
    }

    pub fn set_handlers(&mut self, read_handler: fn(), write_handler: fn()) {
        self.read_handler = Some(read_handler);
        self.write_handler = Some(write_handler);
    }

    /// Route output into an in-memory buffer instead of stdout.
    pub fn capture_output(&mut self) {
        self.sink = Sink::Capture(Vec::new());
    }

    /// Take everything captured so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        match &mut self.sink {
            Sink::Capture(buf) => std::mem::take(buf),
            Sink::Stdout => Vec::new(),
        }
    }

    /// Queue bytes to be served as console input.
    pub fn feed_input(&mut self, bytes: &[u8]) {
        self.source.extend(bytes.iter().copied());
    }

    /// Emit one character; a write-done interrupt follows.
    pub fn put_char(&mut self, ch: u8, interrupt: &mut crate::interrupt::Interrupt) {
        assert!(!self.put_busy, "console write already in progress");
        match &mut self.sink {
            Sink::Stdout => {
                let mut out = std::io::stdout();
                let _ = out.write_all(&[ch]);
                let _ = out.flush();
            }
            Sink::Capture(buf) => buf.push(ch),
        }
        self.put_busy = true;
        interrupt.schedule("console write", CONSOLE_TICKS, Box::new(write_done));
    }

    /// Ask for one character of input; a read-done interrupt follows,
    /// after which [`Console::fetch_char`] yields the character (or
    /// `None` once the input source is exhausted).
    pub fn request_char(&mut self, interrupt: &mut crate::interrupt::Interrupt) {
        interrupt.schedule("console read", CONSOLE_TICKS, Box::new(read_done));
    }

    pub fn fetch_char(&mut self) -> Option<u8> {
        self.incoming.take()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::Machine {
    pub fn console_put_char(&mut self, ch: u8) {
        self.console.put_char(ch, &mut self.interrupt);
    }

    pub fn console_request_char(&mut self) {
        self.console.request_char(&mut self.interrupt);
    }
}

fn write_done() {
    let machine = crate::machine();
    machine.console.put_busy = false;
    machine.stats.console_chars_out += 1;
    if let Some(handler) = machine.console.write_handler {
        handler();
    }
}

fn read_done() {
    let machine = crate::machine();
    machine.console.incoming = machine.console.source.pop_front();
    if machine.console.incoming.is_some() {
        machine.stats.console_chars_in += 1;
    }
    if let Some(handler) = machine.console.read_handler {
        handler();
    }
}
