//! Protocol-wide constants.

/// Current QCP protocol version. Version 2 changed the field order of the
/// communication header; the codec still decodes the version 0/1 layout.
pub const PROTOCOL_VERSION: u8 = 2;

/// Command option bits, packed into the options byte of [`crate::CmdHeader`]
/// and [`crate::FactoryHeader`].
pub mod opt {
    /// Send a DONE notification when the command list completes.
    pub const NOTIFY: u8 = 0x01;
    /// Further actions follow this command.
    pub const ACTION: u8 = 0x02;
    /// Block until the command is done.
    pub const BLOCK: u8 = 0x04;
}
