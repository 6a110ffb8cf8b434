//! Launch option parsing
//!
//! The host hands launch configuration over as an opaque text blob of
//! `key=value` lines. Malformed input fails [`Error::OptionsInvalid`]
//! before anything touches the simulator.

use crate::error::{Error, Result};

/// Kind of executable image, derived from the program path extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Raw binary, loaded at `base` after the ROM warm-up sequence
    RawBinary,
    /// Machine snapshot, loaded directly with no warm-up
    Snapshot,
}

/// Parsed launch options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Path of the program image to debug
    pub program: String,
    /// Load address for raw binaries; module base for snapshots
    pub base: u16,
    /// Entry address the warm-up command jumps to
    pub entry: u16,
    /// Project directory, used to resolve relative paths in the host
    pub project_dir: Option<String>,
    /// Symbol file for the program module
    pub symbol_path: Option<String>,
    /// ROM image loaded at address 0
    pub rom_path: String,
}

const DEFAULT_ROM: &str = "48.rom";

impl LaunchOptions {
    /// Parse the option blob.
    ///
    /// Lines are `key=value`; blank lines and `#` comments are ignored.
    /// Required keys: `program`, `base`, `entry`. Addresses accept decimal
    /// or `0x`-prefixed hex.
    pub fn parse(blob: &str) -> Result<LaunchOptions> {
        let mut program = None;
        let mut base = None;
        let mut entry = None;
        let mut project_dir = None;
        let mut symbol_path = None;
        let mut rom_path = None;

        for raw in blob.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::OptionsInvalid(format!("not key=value: {line:?}")))?;
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() {
                return Err(Error::OptionsInvalid(format!("empty value for {key:?}")));
            }
            match key {
                "program" => program = Some(value.to_string()),
                "base" => base = Some(parse_address(key, value)?),
                "entry" => entry = Some(parse_address(key, value)?),
                "dir" => project_dir = Some(value.to_string()),
                "symbols" => symbol_path = Some(value.to_string()),
                "rom" => rom_path = Some(value.to_string()),
                _ => {
                    return Err(Error::OptionsInvalid(format!("unknown key {key:?}")));
                }
            }
        }

        let program =
            program.ok_or_else(|| Error::OptionsInvalid("missing key \"program\"".into()))?;
        let base = base.ok_or_else(|| Error::OptionsInvalid("missing key \"base\"".into()))?;
        let entry = entry.ok_or_else(|| Error::OptionsInvalid("missing key \"entry\"".into()))?;

        Ok(LaunchOptions {
            program,
            base,
            entry,
            project_dir,
            symbol_path,
            rom_path: rom_path.unwrap_or_else(|| DEFAULT_ROM.to_string()),
        })
    }

    /// Classify the program image by extension.
    pub fn target_kind(&self) -> Result<TargetKind> {
        let ext = self
            .program
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("bin") => Ok(TargetKind::RawBinary),
            Some("sna") => Ok(TargetKind::Snapshot),
            _ => Err(Error::UnsupportedTarget {
                path: self.program.clone(),
            }),
        }
    }
}

fn parse_address(key: &str, value: &str) -> Result<u16> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        value.parse::<u16>()
    };
    parsed.map_err(|_| Error::OptionsInvalid(format!("bad address for {key:?}: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let opts = LaunchOptions::parse("program=game.bin\nbase=0x8000\nentry=32768\n").unwrap();
        assert_eq!(opts.program, "game.bin");
        assert_eq!(opts.base, 0x8000);
        assert_eq!(opts.entry, 0x8000);
        assert_eq!(opts.rom_path, "48.rom");
        assert!(opts.symbol_path.is_none());
    }

    #[test]
    fn test_parse_full() {
        let blob = "\
# launch config
program = game.sna
base = 0x8000
entry = 0x8000
dir = /projects/game
symbols = game.sym
rom = custom.rom
";
        let opts = LaunchOptions::parse(blob).unwrap();
        assert_eq!(opts.project_dir.as_deref(), Some("/projects/game"));
        assert_eq!(opts.symbol_path.as_deref(), Some("game.sym"));
        assert_eq!(opts.rom_path, "custom.rom");
    }

    #[test]
    fn test_parse_missing_required() {
        let err = LaunchOptions::parse("program=game.bin\nbase=0x8000\n").unwrap_err();
        assert!(matches!(err, Error::OptionsInvalid(_)));
        assert!(err.to_string().contains("entry"));
    }

    #[test]
    fn test_parse_bad_address() {
        let err =
            LaunchOptions::parse("program=game.bin\nbase=0xZZ\nentry=0\n").unwrap_err();
        assert!(matches!(err, Error::OptionsInvalid(_)));
    }

    #[test]
    fn test_parse_address_out_of_range() {
        let err =
            LaunchOptions::parse("program=game.bin\nbase=0x10000\nentry=0\n").unwrap_err();
        assert!(matches!(err, Error::OptionsInvalid(_)));
    }

    #[test]
    fn test_parse_unknown_key() {
        let err = LaunchOptions::parse("program=a.bin\nbase=0\nentry=0\nspeed=2\n").unwrap_err();
        assert!(matches!(err, Error::OptionsInvalid(_)));
    }

    #[test]
    fn test_parse_not_key_value() {
        let err = LaunchOptions::parse("just some words\n").unwrap_err();
        assert!(matches!(err, Error::OptionsInvalid(_)));
    }

    #[test]
    fn test_target_kind() {
        let mut opts =
            LaunchOptions::parse("program=game.bin\nbase=0x8000\nentry=0x8000\n").unwrap();
        assert_eq!(opts.target_kind().unwrap(), TargetKind::RawBinary);

        opts.program = "game.SNA".to_string();
        assert_eq!(opts.target_kind().unwrap(), TargetKind::Snapshot);

        opts.program = "game.tap".to_string();
        assert!(matches!(
            opts.target_kind(),
            Err(Error::UnsupportedTarget { .. })
        ));

        opts.program = "noextension".to_string();
        assert!(matches!(
            opts.target_kind(),
            Err(Error::UnsupportedTarget { .. })
        ));
    }
}
