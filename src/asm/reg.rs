use std::fmt::Display;

/// The registers the emitter touches. `Al`, `Ax`, `Eax` and `Cl` are the
/// sub-register views used by `set<cc>`, the widening moves, and the shift
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rsp,
    Rbp,
    R8,
    R9,
    R12,
    R13,
    R14,
    R15,
    Eax,
    Ax,
    Al,
    Cl,
}

impl Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Reg::Rax => "%rax",
            Reg::Rbx => "%rbx",
            Reg::Rcx => "%rcx",
            Reg::Rdx => "%rdx",
            Reg::Rsi => "%rsi",
            Reg::Rdi => "%rdi",
            Reg::Rsp => "%rsp",
            Reg::Rbp => "%rbp",
            Reg::R8 => "%r8",
            Reg::R9 => "%r9",
            Reg::R12 => "%r12",
            Reg::R13 => "%r13",
            Reg::R14 => "%r14",
            Reg::R15 => "%r15",
            Reg::Eax => "%eax",
            Reg::Ax => "%ax",
            Reg::Al => "%al",
            Reg::Cl => "%cl",
        })
    }
}
