//! Administrator controls for the replication slave
//!
//! Each control parses its argument string on the caller's side; only a
//! well-formed [`ControlCommand`] is ever handed to the slave's home task.

use super::config::MasterAddress;
use super::types::{ReplicationError, ReplicationResult};
use serde::Serialize;
use std::collections::BTreeMap;

pub const FAILOVER_RESET: &str = "failover-reset";
pub const NEW_MASTER: &str = "new-master";

/// A parsed, ready-to-run control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    FailoverReset,
    NewMaster(MasterAddress),
}

type ControlHandler = fn(&str) -> ReplicationResult<ControlCommand>;

/// A named control and its help text
#[derive(Clone)]
pub struct Control {
    pub name: &'static str,
    pub help: &'static str,
    handler: ControlHandler,
}

impl Control {
    pub fn parse(&self, args: &str) -> ReplicationResult<ControlCommand> {
        (self.handler)(args)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlInfo {
    pub name: &'static str,
    pub help: &'static str,
}

/// Name → control table owned by a slave
#[derive(Clone)]
pub struct ControlTable {
    controls: BTreeMap<&'static str, Control>,
}

impl ControlTable {
    /// The controls every slave exposes
    pub fn slave_controls() -> Self {
        let mut table = Self {
            controls: BTreeMap::new(),
        };
        table.register(Control {
            name: FAILOVER_RESET,
            help: "Reset the failover module to the state at startup (will force a reconnection to the master).",
            handler: parse_failover_reset,
        });
        table.register(Control {
            name: NEW_MASTER,
            help: "Set a new master for replication (the slave will disconnect and immediately reconnect to the new server). Syntax: \"<host> <port>\"",
            handler: parse_new_master,
        });
        table
    }

    fn register(&mut self, control: Control) {
        self.controls.insert(control.name, control);
    }

    pub fn get(&self, name: &str) -> Option<&Control> {
        self.controls.get(name)
    }

    /// Look up `name` and parse `args` for it
    pub fn parse(&self, name: &str, args: &str) -> ReplicationResult<ControlCommand> {
        self.get(name)
            .ok_or_else(|| ReplicationError::UnknownControl(name.to_string()))?
            .parse(args)
    }

    pub fn list(&self) -> Vec<ControlInfo> {
        self.controls
            .values()
            .map(|c| ControlInfo {
                name: c.name,
                help: c.help,
            })
            .collect()
    }
}

fn parse_failover_reset(args: &str) -> ReplicationResult<ControlCommand> {
    if !args.trim().is_empty() {
        return Err(ReplicationError::InvalidControlArgs(format!(
            "{} takes no arguments, got {:?}",
            FAILOVER_RESET, args
        )));
    }
    Ok(ControlCommand::FailoverReset)
}

fn parse_new_master(args: &str) -> ReplicationResult<ControlCommand> {
    args.parse().map(ControlCommand::NewMaster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_both_controls() {
        let table = ControlTable::slave_controls();
        let names: Vec<&str> = table.list().iter().map(|c| c.name).collect();
        assert_eq!(names, vec![FAILOVER_RESET, NEW_MASTER]);
    }

    #[test]
    fn test_parse_failover_reset() {
        let table = ControlTable::slave_controls();
        assert_eq!(
            table.parse(FAILOVER_RESET, "").unwrap(),
            ControlCommand::FailoverReset
        );
        assert!(matches!(
            table.parse(FAILOVER_RESET, "now"),
            Err(ReplicationError::InvalidControlArgs(_))
        ));
    }

    #[test]
    fn test_parse_new_master() {
        let table = ControlTable::slave_controls();
        let command = table.parse(NEW_MASTER, "db-3 15501").unwrap();
        assert_eq!(
            command,
            ControlCommand::NewMaster(MasterAddress {
                host: "db-3".to_string(),
                port: 15501,
            })
        );

        let err = table.parse(NEW_MASTER, "db-3").unwrap_err();
        assert!(err.to_string().contains("<host> <port>"));
    }

    #[test]
    fn test_unknown_control() {
        let table = ControlTable::slave_controls();
        assert!(matches!(
            table.parse("promote", ""),
            Err(ReplicationError::UnknownControl(_))
        ));
    }
}
