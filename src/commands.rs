//! Argument and return shapes for commonly used remote commands.
//!
//! Shapes are a fixed contract with the remote and are not described on the
//! wire, so they live here as a table instead of being inferred from the stream.

use crate::codec::WireKind;

pub const CMD_ITEM: &str = "G_Item2";
pub const CMD_NAME: &str = "G_Name";
pub const CMD_SET_NAME: &str = "S_Name";
pub const CMD_POSE: &str = "G_Hlocal";
pub const CMD_SET_POSE: &str = "S_Hlocal";
pub const CMD_JOINTS: &str = "G_Thetas";
pub const CMD_SET_JOINTS: &str = "S_Thetas";
pub const CMD_IS_BUSY: &str = "IsBusy";
pub const CMD_REMOVE: &str = "Remove";
pub const CMD_WAIT_MOVE: &str = "WaitMove";
pub const CMD_MAKE_PROGRAM: &str = "MakeProg";

/// Item kind accepted by [`ITEM`] meaning "any kind".
pub const ANY_KIND: i32 = -1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub args: &'static [WireKind],
    pub returns: &'static [WireKind],
    /// Completion time on the remote is unbounded; use the extended timeout.
    pub blocking: bool,
}

/// Looks an item up by name and kind.
pub const ITEM: CommandSpec = CommandSpec {
    name: CMD_ITEM,
    args: &[WireKind::Line, WireKind::Int32],
    returns: &[WireKind::Handle],
    blocking: false,
};

pub const NAME: CommandSpec = CommandSpec {
    name: CMD_NAME,
    args: &[WireKind::Handle],
    returns: &[WireKind::Line],
    blocking: false,
};

pub const SET_NAME: CommandSpec = CommandSpec {
    name: CMD_SET_NAME,
    args: &[WireKind::Handle, WireKind::Line],
    returns: &[],
    blocking: false,
};

/// Pose relative to the item's parent.
pub const POSE: CommandSpec = CommandSpec {
    name: CMD_POSE,
    args: &[WireKind::Handle],
    returns: &[WireKind::Pose],
    blocking: false,
};

pub const SET_POSE: CommandSpec = CommandSpec {
    name: CMD_SET_POSE,
    args: &[WireKind::Handle, WireKind::Pose],
    returns: &[],
    blocking: false,
};

pub const JOINTS: CommandSpec = CommandSpec {
    name: CMD_JOINTS,
    args: &[WireKind::Handle],
    returns: &[WireKind::JointVector],
    blocking: false,
};

pub const SET_JOINTS: CommandSpec = CommandSpec {
    name: CMD_SET_JOINTS,
    args: &[WireKind::JointVector, WireKind::Handle],
    returns: &[],
    blocking: false,
};

/// Non-zero while the item is moving or otherwise occupied.
pub const IS_BUSY: CommandSpec = CommandSpec {
    name: CMD_IS_BUSY,
    args: &[WireKind::Handle],
    returns: &[WireKind::Int32],
    blocking: false,
};

pub const REMOVE: CommandSpec = CommandSpec {
    name: CMD_REMOVE,
    args: &[WireKind::Handle],
    returns: &[],
    blocking: false,
};

/// Returns once the robot's queued motion has finished.
pub const WAIT_MOVE: CommandSpec = CommandSpec {
    name: CMD_WAIT_MOVE,
    args: &[WireKind::Handle],
    returns: &[],
    blocking: true,
};

/// Generates a program into a folder; returns the generator status and log.
pub const MAKE_PROGRAM: CommandSpec = CommandSpec {
    name: CMD_MAKE_PROGRAM,
    args: &[WireKind::Handle, WireKind::Line],
    returns: &[WireKind::Int32, WireKind::Line],
    blocking: true,
};

pub const CATALOG: &[&CommandSpec] = &[
    &ITEM,
    &NAME,
    &SET_NAME,
    &POSE,
    &SET_POSE,
    &JOINTS,
    &SET_JOINTS,
    &IS_BUSY,
    &REMOVE,
    &WAIT_MOVE,
    &MAKE_PROGRAM,
];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    CATALOG.iter().copied().find(|spec| spec.name == name)
}
