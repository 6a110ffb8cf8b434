//! Instruction shape classification for step-over
//!
//! Step-over only needs to know whether the instruction at the program
//! counter transfers control somewhere it will return from, and how long
//! the instruction is so a transient breakpoint can be armed right after
//! it. Nothing here disassembles; anything unrecognized classifies as a
//! plain instruction and falls back to a single step (fail closed).

/// Shape of an instruction that step-over must run past.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallForm {
    /// `CALL nn`
    Call,
    /// `CALL cc,nn`
    ConditionalCall,
    /// `RST n`
    Restart,
    /// `LDIR` / `LDDR` / `CPIR` / `CPDR`
    BlockRepeat,
}

impl CallForm {
    /// Encoded length in bytes.
    pub fn length(&self) -> u16 {
        match self {
            CallForm::Call | CallForm::ConditionalCall => 3,
            CallForm::Restart => 1,
            CallForm::BlockRepeat => 2,
        }
    }
}

/// Classify the instruction starting at `bytes[0]`.
///
/// Returns `None` for every shape step-over can handle with a plain single
/// step, including truncated reads of a prefixed opcode.
pub fn classify_call_form(bytes: &[u8]) -> Option<CallForm> {
    let first = *bytes.first()?;
    match first {
        0xCD => Some(CallForm::Call),
        // 11ccc100: CALL NZ/Z/NC/C/PO/PE/P/M
        b if b & 0xC7 == 0xC4 => Some(CallForm::ConditionalCall),
        // 11ttt111: RST 00h..38h
        b if b & 0xC7 == 0xC7 => Some(CallForm::Restart),
        0xED => match bytes.get(1)? {
            0xB0 | 0xB8 | 0xB1 | 0xB9 => Some(CallForm::BlockRepeat),
            _ => None,
        },
        _ => None,
    }
}
