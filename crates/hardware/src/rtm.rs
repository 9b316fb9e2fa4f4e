//! Intel Restricted Transactional Memory (RTM) backend
//!
//! RTM is the `xbegin`/`xend`/`xabort`/`xtest` instruction group, present
//! on some Haswell and later processors (and disabled by microcode on many
//! of them). The instructions are issued with inline assembly: the compiler
//! intrinsics are not available on stable toolchains.
//!
//! `xbegin` is given a fallback address directly after itself. On start it
//! leaves `eax` untouched (preloaded with the started word); on abort the
//! processor restores the register state from the `xbegin` point, writes
//! the abort status to `eax` and jumps to the fallback address. Both paths
//! therefore leave the asm block with the status in `eax`.

use crate::traits::Htm;
use elide_core::{SectionKey, StatusWord};
use std::arch::asm;

/// RTM instructions on the current x86-64 processor
#[derive(Debug, Clone, Copy)]
pub struct Rtm {
    _detected: (),
}

impl Rtm {
    /// Query the processor and return the backend when RTM is present
    pub fn detect() -> Option<Self> {
        if cpu_has_rtm() {
            Some(Rtm { _detected: () })
        } else {
            None
        }
    }

    /// Raw `xbegin`
    ///
    /// Returns [`StatusWord::STARTED_RAW`] when a transaction started. If it
    /// later aborts, execution resumes here a second time with the abort
    /// status.
    ///
    /// # Safety
    ///
    /// Every code path that observes the started word must end with
    /// [`Htm::commit`] or [`Htm::abort`] in the same stack frame, and must
    /// not rely on anything written between begin and abort.
    #[inline(always)]
    pub unsafe fn begin(&self) -> u32 {
        xbegin()
    }
}

/// CPUID leaf 7, sub-leaf 0, EBX bit 11
#[allow(unused_unsafe)]
fn cpu_has_rtm() -> bool {
    use std::arch::x86_64::{__cpuid, __cpuid_count};

    const RTM_BIT: u32 = 1 << 11;
    // SAFETY: cpuid is available on every x86-64 processor.
    unsafe {
        if __cpuid(0).eax < 7 {
            return false;
        }
        __cpuid_count(7, 0).ebx & RTM_BIT != 0
    }
}

#[inline(always)]
unsafe fn xbegin() -> u32 {
    let status: u32;
    asm!(
        "mov eax, -1",
        "xbegin 2f",
        "2:",
        out("eax") status,
        options(nostack),
    );
    status
}

#[inline(always)]
unsafe fn xend() {
    asm!("xend", options(nostack));
}

#[inline(always)]
fn xtest() -> bool {
    let active: u8;
    // SAFETY: xtest only reads processor state.
    unsafe {
        asm!(
            "xtest",
            "setnz {0}",
            out(reg_byte) active,
            options(nomem, nostack),
        );
    }
    active != 0
}

// xabort only accepts an immediate operand.
macro_rules! xabort_imm {
    ($code:expr; $($imm:literal)*) => {
        match $code {
            $( $imm => asm!("xabort {imm}", imm = const $imm, options(nostack)), )*
        }
    };
}

#[inline(never)]
unsafe fn xabort(reason: u8) {
    xabort_imm!(reason;
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25 26 27 28 29 30
        31 32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47 48 49 50 51 52 53 54 55 56 57 58
        59 60 61 62 63 64 65 66 67 68 69 70 71 72 73 74 75 76 77 78 79 80 81 82 83 84 85 86
        87 88 89 90 91 92 93 94 95 96 97 98 99 100 101 102 103 104 105 106 107 108 109 110
        111 112 113 114 115 116 117 118 119 120 121 122 123 124 125 126 127 128 129 130 131
        132 133 134 135 136 137 138 139 140 141 142 143 144 145 146 147 148 149 150 151 152
        153 154 155 156 157 158 159 160 161 162 163 164 165 166 167 168 169 170 171 172 173
        174 175 176 177 178 179 180 181 182 183 184 185 186 187 188 189 190 191 192 193 194
        195 196 197 198 199 200 201 202 203 204 205 206 207 208 209 210 211 212 213 214 215
        216 217 218 219 220 221 222 223 224 225 226 227 228 229 230 231 232 233 234 235 236
        237 238 239 240 241 242 243 244 245 246 247 248 249 250 251 252 253 254 255
    );
}

impl Htm for Rtm {
    fn is_supported(&self) -> bool {
        true
    }

    fn in_transaction(&self) -> bool {
        xtest()
    }

    fn speculate(&self, _section: SectionKey, region: &mut dyn FnMut()) -> u32 {
        // SAFETY: the started path runs the region and returns with the
        // transaction open; the caller commits or aborts it.
        let status = unsafe { xbegin() };
        if status == StatusWord::STARTED_RAW {
            region();
        }
        status
    }

    fn commit(&self) -> bool {
        // xend outside a transaction raises #GP.
        if !xtest() {
            return false;
        }
        // SAFETY: a transaction is open on this thread.
        unsafe { xend() };
        true
    }

    fn abort(&self, reason: u8) -> bool {
        if !xtest() {
            return false;
        }
        // SAFETY: a transaction is open; control resumes at its xbegin.
        unsafe { xabort(reason) };
        true
    }

    fn name(&self) -> &'static str {
        "rtm"
    }
}
