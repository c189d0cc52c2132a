//! Arista EOS platform definition.
//!
//! Prompt patterns are adapted from [scrapli](https://github.com/carlmontanari/scrapli).
//!
//! # Prompt Examples
//!
//! ```text
//! switch>                            # exec mode
//! switch#                            # privilege_exec mode
//! switch(config)#                    # configuration mode
//! switch(config-if-Et1)#             # config sub-mode (interface)
//! ```
//!
//! File commands go through the EOS CLI `bash` passthrough. Plain `>`
//! redirection would be taken by the CLI itself, so uploads use `dd`.

use super::PlatformDefinition;
use crate::error::Result;

/// Platform name for Arista EOS.
pub const PLATFORM_NAME: &str = "arista_eos";

/// Create the Arista EOS platform definition.
pub fn platform() -> Result<PlatformDefinition> {
    Ok(PlatformDefinition::new(PLATFORM_NAME)?
        .with_prompts(
            r"(?mi)^[\w.\-@()/: ]{1,63}[>#]\s?$",
            r"(?mi)^[\w.\-@()/: ]{1,63}>\s?$",
        )?
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Error")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Cannot commit")
        .with_failure_pattern("% Unavailable command")
        .with_failure_pattern("% Duplicate sequence number")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 32767")
        .with_file_commands(
            "bash timeout 60 sha256sum {path}",
            "bash timeout 600 dd of={path} status=none",
            "bash timeout 600 cat {path}",
        )
        .with_terminal_size(32767, 24))
}
