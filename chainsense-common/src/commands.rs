//! Host bus command codes and request decoding
//!
//! Each command code has a Hamming distance of at least 2 bits from all other codes, so a single
//! flipped bit can never turn one valid command into another. Further codes meeting this criterion
//! (using only the high 4 bits) are 0xC0, 0xE0 and 0xF0.

use snafu::Snafu;

use crate::constants::MAX_NODES;

/// Single byte command codes written by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommandCode {
    /// Request the number of nodes found during discovery
    GetNodeCount = 0x10,
    /// Set the sampling mask of one node. Followed by node index and mask bytes.
    SetNodeMask = 0x20,
    /// Request the status byte of one node. Followed by a node index byte.
    GetNodeSensors = 0x40,
    /// Enter active mode, streaming transition events to the host
    EnableActive = 0x70,
    /// Leave active mode
    DisableActive = 0x80,
}

impl CommandCode {
    /// All defined command codes
    pub const ALL: [CommandCode; 5] = [
        CommandCode::GetNodeCount,
        CommandCode::SetNodeMask,
        CommandCode::GetNodeSensors,
        CommandCode::EnableActive,
        CommandCode::DisableActive,
    ];

    /// The smallest Hamming distance allowed between any two command codes
    pub const MIN_HAMMING_DISTANCE: u32 = 2;

    /// Get the raw command byte
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// The number of argument bytes following the command byte
    pub const fn arg_len(self) -> usize {
        match self {
            CommandCode::GetNodeCount | CommandCode::EnableActive | CommandCode::DisableActive => 0,
            CommandCode::GetNodeSensors => 1,
            CommandCode::SetNodeMask => 2,
        }
    }
}

/// An error for [`CommandCode::try_from()`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownCommandError(pub u8);

impl TryFrom<u8> for CommandCode {
    type Error = UnknownCommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use CommandCode::*;
        match value {
            x if x == GetNodeCount as u8 => Ok(GetNodeCount),
            x if x == SetNodeMask as u8 => Ok(SetNodeMask),
            x if x == GetNodeSensors as u8 => Ok(GetNodeSensors),
            x if x == EnableActive as u8 => Ok(EnableActive),
            x if x == DisableActive as u8 => Ok(DisableActive),
            _ => Err(UnknownCommandError(value)),
        }
    }
}

/// Number of differing bits between two bytes
pub const fn hamming_distance(a: u8, b: u8) -> u32 {
    (a ^ b).count_ones()
}

/// The smallest pairwise Hamming distance in a set of codes
///
/// Returns `u32::MAX` for sets of fewer than two codes.
pub const fn min_pairwise_distance(codes: &[CommandCode]) -> u32 {
    let mut min = u32::MAX;
    let mut i = 0;
    while i < codes.len() {
        let mut j = i + 1;
        while j < codes.len() {
            let d = hamming_distance(codes[i] as u8, codes[j] as u8);
            if d < min {
                min = d;
            }
            j += 1;
        }
        i += 1;
    }
    min
}

const _: () = assert!(
    min_pairwise_distance(&CommandCode::ALL) >= CommandCode::MIN_HAMMING_DISTANCE,
    "host command codes must differ in at least two bits"
);

/// Error returned when a host command frame cannot be decoded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// The host wrote zero bytes
    EmptyCommand,
    /// The command byte is not a known command code
    #[snafu(display("Unknown command code 0x{code:02X}"))]
    UnknownCommand {
        /// The received byte
        code: u8,
    },
    /// The frame is shorter than the command requires
    #[snafu(display("Command {command:?} requires {expected} argument bytes, got {received}"))]
    MissingArgument {
        /// The decoded command
        command: CommandCode,
        /// Argument bytes required
        expected: usize,
        /// Argument bytes received
        received: usize,
    },
    /// The node index argument cannot address a chain slot
    #[snafu(display("Node index {node} is out of range"))]
    NodeOutOfRange {
        /// The received node index
        node: u8,
    },
}

/// A fully decoded host request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostRequest {
    /// Reply with the node count
    GetNodeCount,
    /// Replace a node's sampling mask
    SetNodeMask {
        /// Node index
        node: u8,
        /// New sampling mask
        mask: u8,
    },
    /// Reply with a node's status byte
    GetNodeSensors {
        /// Node index
        node: u8,
    },
    /// Enter or leave active mode
    SetActive(bool),
}

impl HostRequest {
    /// Decode a frame written by the host
    ///
    /// The first byte is the command code, followed by the arguments the command requires. Extra
    /// trailing bytes are ignored. Node indices are checked against [`MAX_NODES`] only; whether
    /// the node exists on the chain is decided by the receiver.
    pub fn parse(frame: &[u8]) -> Result<Self, CommandError> {
        let (&code, args) = frame.split_first().ok_or(CommandError::EmptyCommand)?;
        let command =
            CommandCode::try_from(code).map_err(|e| CommandError::UnknownCommand { code: e.0 })?;
        if args.len() < command.arg_len() {
            return MissingArgumentSnafu {
                command,
                expected: command.arg_len(),
                received: args.len(),
            }
            .fail();
        }

        let node_arg = || {
            let node = args[0];
            if (node as usize) < MAX_NODES {
                Ok(node)
            } else {
                NodeOutOfRangeSnafu { node }.fail()
            }
        };

        Ok(match command {
            CommandCode::GetNodeCount => HostRequest::GetNodeCount,
            CommandCode::SetNodeMask => HostRequest::SetNodeMask {
                node: node_arg()?,
                mask: args[1],
            },
            CommandCode::GetNodeSensors => HostRequest::GetNodeSensors { node: node_arg()? },
            CommandCode::EnableActive => HostRequest::SetActive(true),
            CommandCode::DisableActive => HostRequest::SetActive(false),
        })
    }
}
