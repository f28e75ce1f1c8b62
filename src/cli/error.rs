use crate::script::ScriptError;

// Exit codes for CLI automation
pub const SUCCESS: i32 = 0;
pub const ERROR: i32 = 1;
pub const NOT_FOUND: i32 = 2;
pub const INVALID_INPUT: i32 = 3;

/// Exit code for a script that failed to load
pub fn script_error_code(error: &ScriptError) -> i32 {
    match error {
        ScriptError::FileReadError { .. } | ScriptError::InvalidScriptDirectory(_) => NOT_FOUND,
        ScriptError::MissingMetablock(_)
        | ScriptError::MissingName(_)
        | ScriptError::InvalidPattern { .. } => INVALID_INPUT,
    }
}
