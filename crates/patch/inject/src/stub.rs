//! Trampoline synthesis.
//!
//! A trampoline is a fixed preamble followed by the caller's payload. The
//! preamble forks; the parent jumps to the original entry point so the
//! program behaves as before, and the child falls through into the payload.

/// Linux x86-64 `fork` system call number.
const SYS_FORK_X86_64: u8 = 0x39;

/// Length of the x86-64 preamble in bytes.
pub const X86_64_PREAMBLE_LEN: usize = 22;

/// Build the x86-64 preamble that resumes at `entry` in the parent.
///
/// ```text
/// 6a 39                   push   0x39
/// 58                      pop    rax
/// 0f 05                   syscall
/// 48 85 c0                test   rax, rax
/// 74 0c                   je     <payload>
/// 48 bd <entry:8>         movabs rbp, entry
/// ff e5                   jmp    rbp
/// ```
#[must_use]
pub fn x86_64_preamble(entry: u64) -> Vec<u8> {
    let mut code = Vec::with_capacity(X86_64_PREAMBLE_LEN);
    code.extend_from_slice(&[0x6a, SYS_FORK_X86_64]);
    code.push(0x58);
    code.extend_from_slice(&[0x0f, 0x05]);
    code.extend_from_slice(&[0x48, 0x85, 0xc0]);
    // Skip the 12-byte movabs/jmp pair.
    code.extend_from_slice(&[0x74, 0x0c]);
    code.extend_from_slice(&[0x48, 0xbd]);
    code.extend_from_slice(&entry.to_le_bytes());
    code.extend_from_slice(&[0xff, 0xe5]);
    code
}

/// Preamble plus payload, ready to be written into a cave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trampoline {
    code: Vec<u8>,
    preamble_len: usize,
}

impl Trampoline {
    /// Join a preamble and an opaque payload.
    #[must_use]
    pub fn new(preamble: Vec<u8>, payload: &[u8]) -> Self {
        let preamble_len = preamble.len();
        let mut code = preamble;
        code.extend_from_slice(payload);
        Self { code, preamble_len }
    }

    /// The complete byte sequence.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The preamble part.
    #[must_use]
    pub fn preamble(&self) -> &[u8] {
        &self.code[..self.preamble_len]
    }

    /// The payload part.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.code[self.preamble_len..]
    }

    /// Total length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.code.len() as u64
    }

    /// Returns `true` if there is no code at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Consume into the raw code bytes.
    #[must_use]
    pub fn into_code(self) -> Vec<u8> {
        self.code
    }
}
