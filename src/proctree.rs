//! Descendant discovery and bulk signalling.
//!
//! Development commands habitually fork subshells; signalling just the
//! direct child leaves grandchildren holding ports. The controller
//! snapshots `descendants` right before a stop and reaps the snapshot
//! after the root exits.

use std::collections::HashSet;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// All PIDs transitively descended from `root`, excluding `root` itself.
pub fn descendants(root: u32) -> HashSet<u32> {
    let mut found = HashSet::new();
    let mut frontier = vec![root];
    let table = parent_table();
    while let Some(pid) = frontier.pop() {
        for (&child, &parent) in &table {
            if parent == pid && found.insert(child) {
                frontier.push(child);
            }
        }
    }
    found
}

/// Best-effort delivery of `signal` to every PID; ESRCH (already dead) and
/// EPERM are ignored.
pub fn signal_all(pids: &HashSet<u32>, signal: Signal) {
    for &pid in pids {
        match kill(Pid::from_raw(pid as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) | Err(Errno::EPERM) => {}
            Err(err) => tracing::debug!("signalling pid {pid} failed: {err}"),
        }
    }
}

/// Whether `pid` still exists in the OS process table.
pub fn alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// child pid -> parent pid for every process visible to us.
#[cfg(target_os = "linux")]
fn parent_table() -> std::collections::HashMap<u32, u32> {
    let mut table = std::collections::HashMap::new();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return table;
    };
    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(pid) = name.parse::<u32>() else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        // stat is "pid (comm) state ppid ..."; comm may itself contain
        // spaces and parens, so scan from the last ')'.
        let Some(close) = stat.rfind(')') else {
            continue;
        };
        let mut fields = stat[close + 1..].split_whitespace();
        let _state = fields.next();
        if let Some(ppid) = fields.next().and_then(|field| field.parse::<u32>().ok()) {
            table.insert(pid, ppid);
        }
    }
    table
}

#[cfg(not(target_os = "linux"))]
fn parent_table() -> std::collections::HashMap<u32, u32> {
    // BSD/macOS: ask ps for the whole table in one shot.
    let mut table = std::collections::HashMap::new();
    let Ok(output) = std::process::Command::new("ps")
        .args(["-axo", "pid=,ppid="])
        .output()
    else {
        return table;
    };
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let mut fields = line.split_whitespace();
        let pid = fields.next().and_then(|f| f.parse::<u32>().ok());
        let ppid = fields.next().and_then(|f| f.parse::<u32>().ok());
        if let (Some(pid), Some(ppid)) = (pid, ppid) {
            table.insert(pid, ppid);
        }
    }
    table
}
