//! In-memory stand-in for the editing shell, used by the verifier and
//! injector tests.

use super::{SessionError, ShellSession};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    pub dir: String,
    pub name: String,
    pub host: PathBuf,
}

/// Models only the directory tree and the files written into it.
#[derive(Debug)]
pub struct FakeShell {
    pub dirs: BTreeSet<String>,
    pub cwd: String,
    pub log: Vec<String>,
    pub written: Vec<Written>,
    in_flight: bool,
}

impl FakeShell {
    pub fn new() -> Self {
        Self {
            dirs: BTreeSet::from(["/".to_string()]),
            cwd: "/".to_string(),
            log: Vec::new(),
            written: Vec::new(),
            in_flight: false,
        }
    }

    pub fn with_dirs(dirs: &[&str]) -> Self {
        let mut shell = Self::new();
        shell.dirs.extend(dirs.iter().map(|d| d.to_string()));
        shell
    }

    pub fn commands(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{verb} ");
        self.log
            .iter()
            .filter_map(|l| l.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else if self.cwd == "/" {
            format!("/{path}")
        } else {
            format!("{}/{path}", self.cwd)
        }
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rfind('/') {
            Some(0) => true,
            Some(i) => self.dirs.contains(&path[..i]),
            None => false,
        }
    }
}

impl ShellSession for FakeShell {
    fn exec(&mut self, command: &str) -> Result<String, SessionError> {
        assert!(!self.in_flight, "command sent while another was in flight");
        self.in_flight = true;
        self.log.push(command.to_string());

        let args = split_args(command);
        let response = match args.iter().map(String::as_str).collect::<Vec<_>>()[..] {
            ["cd", path] => {
                let path = self.resolve(path);
                if self.dirs.contains(&path) {
                    self.cwd = path;
                    String::new()
                } else {
                    format!("cd: File not found by ext2_lookup while looking up {path}\n")
                }
            }
            ["mkdir", path] => {
                let path = self.resolve(path);
                if !self.parent_exists(&path) {
                    format!("mkdir: File not found by ext2_lookup while creating {path}\n")
                } else if !self.dirs.insert(path) {
                    "mkdir: Ext2 directory already exists\n".to_string()
                } else {
                    String::new()
                }
            }
            ["write", host, name] => {
                let entry = Written {
                    dir: self.cwd.clone(),
                    name: name.to_string(),
                    host: PathBuf::from(host),
                };
                if self.written.iter().any(|w| w.dir == entry.dir && w.name == entry.name) {
                    "write: Ext2 file already exists\n".to_string()
                } else {
                    self.written.push(entry);
                    "Allocated inode: 12\n".to_string()
                }
            }
            _ => format!("{command}: Command not found\n"),
        };

        self.in_flight = false;
        Ok(response)
    }
}

/// Split a command line the way the shell's parser does: whitespace
/// separated, double quotes group, `""` inside quotes is a literal quote.
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => {
                quoted = !quoted;
                in_arg = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

#[test]
fn split_args_understands_quoting() {
    assert_eq!(split_args("cd /a"), ["cd", "/a"]);
    assert_eq!(split_args("mkdir \"/a b\""), ["mkdir", "/a b"]);
    assert_eq!(split_args("write \"x\"\"y\" z"), ["write", "x\"y", "z"]);
}
