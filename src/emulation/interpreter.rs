//! Reference interpreter for SSA functions.
//!
//! Every value is a bit pattern masked to the width of its type. Pointers are
//! plain 64-bit addresses into a [`SparseMemory`]. Phis of a block are evaluated
//! together on entry, using the values of the predecessor that was left.
//!
//! Execution is bounded by a step budget; running out of it yields
//! [`Error::StepLimit`] instead of hanging on a miscompiled loop.

use log::trace;

use crate::{
    analysis::ssa::{
        mask_bits, sign_extend, BitCountKind, CastKind, CompareKind, SsaFunction, SsaOp, SsaType,
        SsaVarId,
    },
    emulation::memory::SparseMemory,
    Error, Result,
};

/// Default number of instructions a run may execute.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Where control goes after a terminator.
enum Flow {
    Next(usize),
    Return(Option<u128>),
}

/// Executes an [`SsaFunction`] on concrete arguments.
///
/// # Example
///
/// ```rust
/// use loopidiom::analysis::ssa::{FunctionBuilder, SsaType};
/// use loopidiom::emulation::Interpreter;
///
/// let mut f = FunctionBuilder::new("double", SsaType::I8);
/// let x = f.param(SsaType::I8, false);
/// let entry = f.block("entry");
/// f.switch_to(entry);
/// let sum = f.add(x, x);
/// f.ret(Some(sum));
/// let ssa = f.finish()?;
///
/// assert_eq!(Interpreter::new(&ssa).run(&[200])?, Some(144));
/// # Ok::<(), loopidiom::Error>(())
/// ```
pub struct Interpreter<'a> {
    ssa: &'a SsaFunction,
    memory: SparseMemory,
    values: Vec<Option<u128>>,
    step_limit: u64,
    steps: u64,
}

impl<'a> Interpreter<'a> {
    /// Creates an interpreter over empty memory.
    #[must_use]
    pub fn new(ssa: &'a SsaFunction) -> Self {
        Interpreter {
            ssa,
            memory: SparseMemory::new(),
            values: vec![None; ssa.variables().len()],
            step_limit: DEFAULT_STEP_LIMIT,
            steps: 0,
        }
    }

    /// Seeds memory at `address` with `bytes`.
    ///
    /// Seeding a range that wraps around the address space is ignored.
    #[must_use]
    pub fn with_memory(mut self, address: u64, bytes: &[u8]) -> Self {
        if self.memory.write(address, bytes).is_err() {
            trace!("ignoring memory seed at {:#x}", address);
        }
        self
    }

    /// Replaces the step budget.
    #[must_use]
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Returns the memory as left by the last run.
    #[must_use]
    pub fn memory(&self) -> &SparseMemory {
        &self.memory
    }

    /// Returns the number of instructions the last run executed.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs the function and returns its result, if it has one.
    ///
    /// # Arguments
    ///
    /// * `args` - One bit pattern per parameter; each is masked to the parameter's type
    ///
    /// # Errors
    ///
    /// - [`Error::Emulation`] on a wrong argument count, an undefined value, a call,
    ///   or reaching `unreachable`
    /// - [`Error::StepLimit`] if the step budget runs out
    pub fn run(&mut self, args: &[u128]) -> Result<Option<u128>> {
        let params = self.ssa.params();
        if params.len() != args.len() {
            return Err(Error::Emulation(format!(
                "{} expects {} arguments, got {}",
                self.ssa.name(),
                params.len(),
                args.len()
            )));
        }
        self.steps = 0;
        self.values.iter_mut().for_each(|v| *v = None);
        for (param, &arg) in params.iter().zip(args) {
            self.set(param.var, arg);
        }

        let mut block = self.ssa.entry_block();
        loop {
            match self.run_block(block)? {
                Flow::Next(next) => {
                    self.enter(block, next)?;
                    block = next;
                }
                Flow::Return(value) => return Ok(value),
            }
        }
    }

    fn run_block(&mut self, block: usize) -> Result<Flow> {
        let ops: Vec<SsaOp> = self.ssa.block_ops(block).map(|(_, op)| op.clone()).collect();
        for op in &ops {
            self.steps += 1;
            if self.steps > self.step_limit {
                return Err(Error::StepLimit(self.step_limit));
            }
            if let Some(flow) = self.step(op)? {
                return Ok(flow);
            }
        }
        Err(Error::Emulation(format!("b{} has no terminator", block)))
    }

    /// Assigns the phis of `to` from the values flowing out of `from`.
    fn enter(&mut self, from: usize, to: usize) -> Result<()> {
        let Some(target) = self.ssa.block(to) else {
            return Err(Error::Emulation(format!("jump to missing b{}", to)));
        };
        let incoming = target
            .phi_nodes()
            .iter()
            .map(|phi| {
                let value = phi.value_from(from).ok_or_else(|| {
                    Error::Emulation(format!(
                        "phi {} in b{} has no value from b{}",
                        phi.result(),
                        to,
                        from
                    ))
                })?;
                Ok((phi.result(), self.get(value)?))
            })
            .collect::<Result<Vec<_>>>()?;
        for (var, value) in incoming {
            self.set(var, value);
        }
        Ok(())
    }

    fn get(&self, var: SsaVarId) -> Result<u128> {
        self.values
            .get(var.index())
            .copied()
            .flatten()
            .ok_or_else(|| Error::Emulation(format!("{} read before it was defined", var)))
    }

    fn set(&mut self, var: SsaVarId, value: u128) {
        let masked = value & mask_bits(self.ssa.var_type(var).bits());
        if let Some(slot) = self.values.get_mut(var.index()) {
            *slot = Some(masked);
        }
    }

    fn bits(&self, var: SsaVarId) -> u32 {
        self.ssa.var_type(var).bits()
    }

    fn address(&self, var: SsaVarId) -> Result<u64> {
        Ok(self.get(var)? as u64)
    }

    fn step(&mut self, op: &SsaOp) -> Result<Option<Flow>> {
        match op {
            SsaOp::Const { dest, value } => self.set(*dest, value.as_u128().unwrap_or(0)),
            SsaOp::Copy { dest, src } => {
                let v = self.get(*src)?;
                self.set(*dest, v);
            }
            SsaOp::Add { dest, left, right } => {
                let v = self.get(*left)?.wrapping_add(self.get(*right)?);
                self.set(*dest, v);
            }
            SsaOp::Sub { dest, left, right } => {
                let v = self.get(*left)?.wrapping_sub(self.get(*right)?);
                self.set(*dest, v);
            }
            SsaOp::Mul { dest, left, right } => {
                let v = self.get(*left)?.wrapping_mul(self.get(*right)?);
                self.set(*dest, v);
            }
            SsaOp::And { dest, left, right } => {
                let v = self.get(*left)? & self.get(*right)?;
                self.set(*dest, v);
            }
            SsaOp::Or { dest, left, right } => {
                let v = self.get(*left)? | self.get(*right)?;
                self.set(*dest, v);
            }
            SsaOp::Xor { dest, left, right } => {
                let v = self.get(*left)? ^ self.get(*right)?;
                self.set(*dest, v);
            }
            SsaOp::Shl {
                dest,
                value,
                amount,
            } => {
                let bits = self.bits(*value);
                let amount = self.get(*amount)?;
                let v = if amount >= u128::from(bits) {
                    0
                } else {
                    self.get(*value)? << amount
                };
                self.set(*dest, v);
            }
            SsaOp::Shr {
                dest,
                value,
                amount,
                arithmetic,
            } => {
                let bits = self.bits(*value);
                let amount = self.get(*amount)?;
                let x = self.get(*value)?;
                let v = if *arithmetic {
                    let shift = amount.min(u128::from(bits - 1)) as u32;
                    (sign_extend(x, bits) >> shift) as u128
                } else if amount >= u128::from(bits) {
                    0
                } else {
                    x >> amount
                };
                self.set(*dest, v);
            }
            SsaOp::Cmp {
                dest,
                kind,
                left,
                right,
            } => {
                let bits = self.bits(*left);
                let v = kind.evaluate(self.get(*left)?, self.get(*right)?, bits);
                self.set(*dest, u128::from(v));
            }
            SsaOp::Cast {
                dest,
                kind,
                operand,
            } => {
                let x = self.get(*operand)?;
                let v = match kind {
                    CastKind::SExt => sign_extend(x, self.bits(*operand)) as u128,
                    CastKind::ZExt | CastKind::Trunc | CastKind::PtrToInt | CastKind::IntToPtr => x,
                };
                self.set(*dest, v);
            }
            SsaOp::PtrAdd { dest, base, offset } => {
                let v = self.get(*base)?.wrapping_add(self.get(*offset)?);
                self.set(*dest, v);
            }
            SsaOp::Alloca { dest, size } => {
                let address = self.memory.alloca(*size)?;
                self.set(*dest, u128::from(address));
            }
            SsaOp::Load { dest, addr, .. } => {
                let size = access_size(self.ssa.var_type(*dest));
                let v = self.memory.read_int(self.address(*addr)?, size)?;
                self.set(*dest, v);
            }
            SsaOp::Store { addr, value, .. } => {
                let size = access_size(self.ssa.var_type(*value));
                let v = self.get(*value)?;
                let address = self.address(*addr)?;
                self.memory.write_int(address, size, v)?;
            }
            SsaOp::MemSet {
                addr, value, len, ..
            } => {
                let byte = self.get(*value)? as u8;
                let len = self.get(*len)? as u64;
                let address = self.address(*addr)?;
                self.memory.fill(address, byte, len)?;
            }
            SsaOp::MemSetPattern {
                addr, pattern, len, ..
            } => {
                let len = self.get(*len)? as u64;
                let address = self.address(*addr)?;
                self.memory.fill_pattern(address, pattern, len)?;
            }
            SsaOp::MemCpy { dest, src, len, .. } => {
                let len = self.get(*len)? as u64;
                let (to, from) = (self.address(*dest)?, self.address(*src)?);
                self.memory.copy(to, from, len)?;
            }
            SsaOp::MemCmp {
                dest,
                kind,
                left,
                right,
                len,
            } => {
                let len = self.get(*len)? as u64;
                let order = self
                    .memory
                    .compare(self.address(*left)?, self.address(*right)?, len)?;
                let v: i128 = match (kind, order) {
                    (_, std::cmp::Ordering::Equal) => 0,
                    (CompareKind::Bcmp, _) | (CompareKind::Memcmp, std::cmp::Ordering::Greater) => 1,
                    (CompareKind::Memcmp, std::cmp::Ordering::Less) => -1,
                };
                self.set(*dest, v as u128);
            }
            SsaOp::BitCount {
                dest,
                kind,
                operand,
                ..
            } => {
                let bits = self.bits(*operand);
                let x = self.get(*operand)?;
                let v = match kind {
                    BitCountKind::Ctpop => x.count_ones(),
                    BitCountKind::Ctlz => x.leading_zeros() - (128 - bits),
                    BitCountKind::Cttz => x.trailing_zeros().min(bits),
                };
                self.set(*dest, u128::from(v));
            }
            SsaOp::Call { callee, .. } => {
                return Err(Error::Emulation(format!("cannot call {}", callee)));
            }
            SsaOp::Fence => {}
            SsaOp::Jump { target } => return Ok(Some(Flow::Next(*target))),
            SsaOp::Branch {
                condition,
                true_target,
                false_target,
            } => {
                let target = if self.get(*condition)? != 0 {
                    *true_target
                } else {
                    *false_target
                };
                return Ok(Some(Flow::Next(target)));
            }
            SsaOp::Return { value } => {
                let v = value.map(|v| self.get(v)).transpose()?;
                return Ok(Some(Flow::Return(v)));
            }
            SsaOp::Unreachable => {
                return Err(Error::Emulation(format!(
                    "{} reached unreachable code",
                    self.ssa.name()
                )));
            }
        }
        Ok(None)
    }
}

fn access_size(ty: SsaType) -> u64 {
    ty.store_size()
}
