#![allow(dead_code)]

use std::time::{Duration, Instant};

use ttyrelay_terminal::{
    BackendFactory, InferiorKind, InvocationTable, RegistryConfig, SessionId, SessionRegistry,
};

/// Registry whose sessions run `command` with plain pipes
pub fn process_registry(command: &[&str]) -> SessionRegistry {
    let factory = BackendFactory::new(InferiorKind::Process)
        .command(command.iter().map(|s| s.to_string()).collect());
    SessionRegistry::new(factory, RegistryConfig::default())
}

/// Registry whose sessions run the entry point `entry` from `table`
pub fn invocation_registry(table: InvocationTable, entry: &str) -> SessionRegistry {
    let factory = BackendFactory::new(InferiorKind::Invocation)
        .invocations(table)
        .entry(entry);
    SessionRegistry::new(factory, RegistryConfig::default())
}

/// Poll a session until its output ends, returning everything drained
pub fn drain_until_closed(registry: &SessionRegistry, id: SessionId) -> String {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut out = String::new();
    loop {
        let (text, closed) = registry.drain_output(id).expect("session vanished");
        out.push_str(&text);
        if closed || Instant::now() > deadline {
            return out;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Poll until the drained output contains `needle`
pub fn drain_until_contains(registry: &SessionRegistry, id: SessionId, needle: &str) -> String {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut out = String::new();
    while !out.contains(needle) && Instant::now() < deadline {
        let (text, _) = registry.drain_output(id).expect("session vanished");
        out.push_str(&text);
        std::thread::sleep(Duration::from_millis(10));
    }
    out
}

/// Remove CSI (`ESC [ ... letter`) and OSC (`ESC ] ... BEL`) sequences
pub fn strip_escapes(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\x1b' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('[') => {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            Some(']') => {
                for c in chars.by_ref() {
                    if c == '\x07' {
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    out
}
