//! Error taxonomy and the W1 error-code table.

use thiserror::Error;

/// Errors surfaced by the spinning disk driver.
#[derive(Debug, Error)]
pub enum W1Error {
    /// The serial port could not be opened. Fatal to driver construction.
    #[error("could not initialize W1 on '{port}': {reason}")]
    Init {
        /// Port path the open was attempted on.
        port: String,
        /// What went wrong while opening.
        reason: String,
    },

    /// The device rejected a command with a coded `N` acknowledgement.
    #[error("W1 error {code}: {message}")]
    Command {
        /// Numeric error code from the reply.
        code: String,
        /// Decode from the fixed table, or "Unknown error".
        message: &'static str,
    },

    /// A command was attempted after [`disconnect`](crate::W1Driver::disconnect).
    #[error("serial port not connected")]
    NotConnected,

    /// A reply was required but none arrived before the read timeout.
    #[error("no acknowledgement for '{command}'")]
    Unacknowledged {
        /// Command that went unanswered.
        command: String,
    },

    /// A required reply could not be parsed.
    #[error("unusable reply to '{command}': '{reply}'")]
    BadReply {
        /// Command the reply belongs to.
        command: String,
        /// Raw reply text.
        reply: String,
    },

    /// A settings field is outside its documented range.
    #[error("{field} = {value} outside {min}-{max}")]
    SettingOutOfRange {
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: u32,
        /// Lower bound, inclusive.
        min: u32,
        /// Upper bound, inclusive.
        max: u32,
    },

    /// Transport-level read/write failure.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode a W1 numeric error code.
///
/// Fixed table from the CSU-W1 command reference; unrecognized codes decode
/// to `"Unknown error"`.
pub fn describe_error_code(code: &str) -> &'static str {
    match code {
        "30005" => "Command name error",
        "30006" => "Command argument number error",
        "30007" => "Command argument value error",
        "30141" => "Command argument value error",
        "30012" => "Interlock alarm is on",
        "30133" => "Interlock alarm is on",
        "30014" => "Electricity alarm is on",
        "30015" => "Shutter alarm is on",
        "30016" => "Actuator alarm is on",
        "30017" => "Disk alarm is on",
        "30018" => "Data error alarm is on",
        "30019" => "Other alarm is on",
        "30021" => "Designated system is not defined",
        "30022" => "Designated system does not exist",
        "30023" => "Designated system is not detected",
        "30031" => "Waiting for initialization to complete",
        "30032" => "Under maintenance mode",
        "30201" => "External SYNC signal is under use",
        "30204" => "Disk rotation stopped",
        "30301" => "Shutter error",
        "30302" => "Shutter unopenable error",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_decode() {
        assert_eq!(describe_error_code("30005"), "Command name error");
        assert_eq!(describe_error_code("30204"), "Disk rotation stopped");
        assert_eq!(describe_error_code("30301"), "Shutter error");
    }

    #[test]
    fn unknown_codes_fall_back() {
        assert_eq!(describe_error_code("99999"), "Unknown error");
        assert_eq!(describe_error_code(""), "Unknown error");
    }

    #[test]
    fn command_error_message_includes_code_and_decode() {
        let err = W1Error::Command {
            code: "30204".to_string(),
            message: describe_error_code("30204"),
        };
        assert_eq!(err.to_string(), "W1 error 30204: Disk rotation stopped");
    }
}
