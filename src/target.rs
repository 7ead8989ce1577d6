/// Selector for the process being watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Exact process identifier.
    Pid(u32),
    /// Process name, or a substring of its command line.
    Name(String),
}

impl Target {
    /// Build a target from the optional selectors. A PID takes precedence
    /// over a name; returns `None` when neither is usable.
    pub fn from_selectors(name: Option<&str>, pid: Option<u32>) -> Option<Target> {
        if let Some(pid) = pid {
            return Some(Target::Pid(pid));
        }
        match name {
            Some(n) if !n.is_empty() => Some(Target::Name(n.to_string())),
            _ => None,
        }
    }

    /// Whether a process with the given name and argv matches this target.
    ///
    /// Name targets match on an exact process name or a substring of the
    /// space-joined command line. PID targets never match by name.
    pub fn matches(&self, process_name: &str, cmdline: &[String]) -> bool {
        match self {
            Target::Pid(_) => false,
            Target::Name(name) => {
                process_name == name || (!cmdline.is_empty() && cmdline.join(" ").contains(name))
            }
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Pid(pid) => write!(f, "pid {pid}"),
            Target::Name(name) => write!(f, "{name}"),
        }
    }
}
