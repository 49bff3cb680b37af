//! Bytecode interpreter.
use rand::Rng;

use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
    instr::Op,
    keypad::KeyCode,
    memory::check_pc,
    vm::{Chip8Vm, Flow},
};

impl Chip8Vm {
    /// Fetch, decode and execute one instruction.
    ///
    /// The program counter is advanced before execution, so jumps
    /// simply overwrite it. Every fallible check happens before the
    /// instruction writes any state, so the caller only needs to
    /// restore the program counter on error.
    pub(crate) fn cycle(&mut self) -> Chip8Result<Flow> {
        let pc = self.cpu.registers.pc();
        let opcode = self.cpu.ram.read_word(pc as usize)?;
        let op = Op::decode(opcode, pc)?;

        op_trace(pc, opcode, &op);

        // Jumps check their own target, everything else falls through
        // to the next instruction which must still be in memory.
        if !op.is_jump() {
            check_pc(pc.wrapping_add(2))?;
        }

        self.cpu.registers.advance_pc();
        self.exec(op)
    }

    fn exec(&mut self, op: Op) -> Chip8Result<Flow> {
        let quirks = self.config().quirks;
        let cpu = &mut self.cpu;
        let regs = &mut cpu.registers;

        let mut control_flow = Flow::Ok;

        match op {
            // 0nnn (SYS addr)
            //
            // Machine code routines of the COSMAC VIP can't be emulated.
            Op::Sys { .. } => { /* No Op */ }
            // 00E0 (CLS)
            //
            // Clear display
            Op::ClearScreen => {
                cpu.display.clear();
                control_flow = Flow::Draw;
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Set the program counter to the address at the top of the stack.
            Op::Return => {
                let address = cpu.stack.peek().ok_or(Chip8Error::StackUnderflow)?;
                check_pc(address)?;
                cpu.stack.pop()?;
                regs.set_pc(address);
                control_flow = Flow::Jump;
            }
            // 1nnn (JP addr)
            //
            // Jump to address.
            Op::JumpAddress { address } => {
                regs.jump(address)?;
                control_flow = Flow::Jump;
            }
            // 2nnn (CALL addr)
            //
            // Call subroutine at NNN.
            // The program counter already points at the next instruction,
            // which is where the subroutine returns to.
            Op::Call { address } => {
                check_pc(address)?;
                cpu.stack.push(regs.pc())?;
                regs.set_pc(address);
                control_flow = Flow::Jump;
            }
            // 3xnn (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            Op::Skip_Eq_Byte { vx, nn } => {
                if regs.get(vx) == nn {
                    regs.skip()?;
                }
            }
            // 4xnn (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            Op::Skip_NotEq_Byte { vx, nn } => {
                if regs.get(vx) != nn {
                    regs.skip()?;
                }
            }
            // 5xy0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals value VY.
            Op::Skip_Eq { vx, vy } => {
                if regs.get(vx) == regs.get(vy) {
                    regs.skip()?;
                }
            }
            // 6xnn (LD Vx, byte)
            //
            // Set register VX to value NN.
            Op::Load_Byte { vx, nn } => regs.set(vx, nn),
            // 7xnn (ADD Vx, byte)
            //
            // Add value NN to register VX. Carry flag is not set.
            Op::Add_Byte { vx, nn } => regs.set(vx, regs.get(vx).wrapping_add(nn)),
            // 8xy0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            Op::Load_Vx_Vy { vx, vy } => regs.set(vx, regs.get(vy)),
            // 8xy1 (OR Vx, Vy)
            //
            // Performs bitwise OR on VX and VY, and stores the result in VX.
            Op::Or_Vx_Vy { vx, vy } => {
                regs.set(vx, regs.get(vx) | regs.get(vy));
                if quirks.logic_resets_vf {
                    regs.set_flag(0);
                }
            }
            // 8xy2 (AND Vx, Vy)
            //
            // Performs bitwise AND on VX and VY, and stores the result in VX.
            Op::And_Vx_Vy { vx, vy } => {
                regs.set(vx, regs.get(vx) & regs.get(vy));
                if quirks.logic_resets_vf {
                    regs.set_flag(0);
                }
            }
            // 8xy3 (XOR Vx, Vy)
            //
            // Performs bitwise XOR on VX and VY, and stores the result in VX.
            Op::Xor_Vx_Vy { vx, vy } => {
                regs.set(vx, regs.get(vx) ^ regs.get(vy));
                if quirks.logic_resets_vf {
                    regs.set_flag(0);
                }
            }
            // 8xy4 (ADD Vx, Vy)
            //
            // ADDs VY to VX, and stores the result in VX.
            // Overflow is wrapped.
            // If overflow, set VF to 1, else 0.
            //
            // The flag is written last, so it wins when VX is VF.
            Op::Add_Vx_Vy { vx, vy } => {
                let (result, carry) = regs.get(vx).overflowing_add(regs.get(vy));
                regs.set(vx, result);
                regs.set_flag(carry as u8);
            }
            // 8xy5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX, and stores the result in VX.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            Op::Sub_Vx_Vy { vx, vy } => {
                let (result, borrow) = regs.get(vx).overflowing_sub(regs.get(vy));
                regs.set(vx, result);
                regs.set_flag(!borrow as u8);
            }
            // 8xy6 (SHR Vx {, Vy})
            //
            // VF receives the least-significant bit that is shifted out.
            Op::ShiftRight { vx, vy } => {
                let value = regs.get(if quirks.shift_reads_vy { vy } else { vx });
                regs.set(vx, value >> 1);
                regs.set_flag(value & 1);
            }
            // 8xy7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY, and stores the result in VX.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            Op::SubReverse_Vx_Vy { vx, vy } => {
                let (result, borrow) = regs.get(vy).overflowing_sub(regs.get(vx));
                regs.set(vx, result);
                regs.set_flag(!borrow as u8);
            }
            // 8xyE (SHL Vx {, Vy})
            //
            // VF receives the most-significant bit that is shifted out.
            Op::ShiftLeft { vx, vy } => {
                let value = regs.get(if quirks.shift_reads_vy { vy } else { vx });
                regs.set(vx, value << 1);
                regs.set_flag(value >> 7);
            }
            // 9xy0 (SNE Vx, Vy)
            //
            // Skip next instruction if Vx != Vy.
            Op::Skip_NotEq { vx, vy } => {
                if regs.get(vx) != regs.get(vy) {
                    regs.skip()?;
                }
            }
            // Annn (LD I, addr)
            //
            // Set address register I to value NNN.
            Op::Load_Address { address } => regs.set_index(address),
            // Bnnn (JP V0, addr)
            //
            // Jump to location nnn + V0.
            // The offset can carry the target past the end of memory.
            Op::Jump_V0 { vx, address } => {
                let offset = regs.get(if quirks.jump_uses_vx { vx } else { 0 });
                regs.jump(address + offset as Address)?;
                control_flow = Flow::Jump;
            }
            // Cxnn (RND Vx, byte)
            //
            // Set register VX to the result of bitwise AND between a random number and NN.
            Op::Random { vx, nn } => regs.set(vx, self.rng.gen::<u8>() & nn),
            // Dxyn (DRW Vx, Vy, nibble)
            //
            // Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
            // Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
            // memory pointed to by address register I.
            //
            // If the drawing operation erases existing pixels in the display buffer, register VF is set to
            // 1, and set to 0 if no display bits are unset. This is used for collision detection.
            Op::Draw { vx, vy, n } => {
                let sprite = cpu.ram.read_slice(regs.index() as usize, n as usize)?;
                let is_erased =
                    cpu.display
                        .draw_with(regs.get(vx), regs.get(vy), sprite, quirks.wrap_sprites);

                // If a pixel was erased, then a collision occurred.
                regs.set_flag(is_erased as u8);
                control_flow = Flow::Draw;
            }
            // Ex9E (SKP Vx)
            //
            // Skip the next instruction if the key in Vx is pressed.
            // Only the lower nibble of Vx identifies the key.
            Op::Skip_Key { vx } => {
                if cpu.keypad.is_pressed(KeyCode::from_nibble(regs.get(vx))) {
                    regs.skip()?;
                }
            }
            // ExA1 (SKNP Vx)
            Op::Skip_NotKey { vx } => {
                if !cpu.keypad.is_pressed(KeyCode::from_nibble(regs.get(vx))) {
                    regs.skip()?;
                }
            }
            // Fx07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            Op::Load_Vx_Delay { vx } => regs.set(vx, cpu.timers.delay()),
            // Fx0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            // All execution stops until a key is pressed, then the value of that key is stored in Vx.
            Op::Load_Vx_Key { vx } => {
                cpu.keypad.arm();

                if let Some(key) = cpu.keypad.await_any_pressed() {
                    regs.set(vx, key.as_u8());
                } else {
                    // rewind the program counter to stall the machine
                    regs.set_pc(regs.pc().wrapping_sub(2));
                    control_flow = Flow::KeyWait;
                }
            }
            // Fx15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            Op::Load_Delay_Vx { vx } => cpu.timers.set_delay(regs.get(vx)),
            // Fx18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            Op::Load_Sound_Vx { vx } => {
                cpu.timers.set_sound(regs.get(vx));
                control_flow = Flow::Sound;
            }
            // Fx1E (ADD I, Vx)
            //
            // Add Vx to I. VF is not affected.
            Op::Add_Address_Vx { vx } => {
                let address = regs.index().wrapping_add(regs.get(vx) as Address);
                regs.set_index(address & ADDRESS_MASK);
            }
            // Fx29 (LD F, Vx)
            //
            // Set I = location of sprite for digit Vx.
            Op::Load_Font { vx } => {
                let digit = (regs.get(vx) & 0xF) as Address;
                regs.set_index(FONTSET_START + digit * FONTSET_HEIGHT as Address);
            }
            // Fx33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            Op::Store_Bcd { vx } => {
                let x = regs.get(vx);
                let bcd = [x / 100, x / 10 % 10, x % 10];
                cpu.ram.write_slice(regs.index() as usize, &bcd)?;
            }
            // Fx55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            Op::Store_Registers { vx } => {
                cpu.ram.write_slice(regs.index() as usize, regs.range(vx))?;
                if quirks.load_store_increments_i {
                    regs.set_index(regs.index().wrapping_add(vx as Address + 1));
                }
            }
            // Fx65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            Op::Load_Registers { vx } => {
                let values = cpu.ram.read_slice(regs.index() as usize, vx as usize + 1)?;
                regs.range_mut(vx).copy_from_slice(values);
                if quirks.load_store_increments_i {
                    regs.set_index(regs.index().wrapping_add(vx as Address + 1));
                }
            }
        }

        Ok(control_flow)
    }
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(pc: Address, opcode: u16, op: &Op) {
    log::trace!("{pc:04X}: {opcode:04X} {op}");
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: Address, _: u16, _: &Op) {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{quirks::Quirks, vm::Chip8Conf};

    fn vm_with(bytecode: &[u8]) -> Chip8Vm {
        vm_with_quirks(bytecode, Quirks::default())
    }

    fn vm_with_quirks(bytecode: &[u8], quirks: Quirks) -> Chip8Vm {
        let mut vm = Chip8Vm::new(Chip8Conf {
            quirks,
            rng_seed: Some(0x5EED),
            ..Default::default()
        });
        vm.load(bytecode).unwrap();
        vm
    }

    fn pc(vm: &Chip8Vm) -> usize {
        vm.cpu.registers.pc() as usize
    }

    fn v(vm: &Chip8Vm, vx: u8) -> u8 {
        vm.cpu.registers.get(vx)
    }

    #[test]
    #[rustfmt::skip]
    fn test_load_and_add() {
        let mut vm = vm_with(&[
            0x60, 0x0A, // LD v0, 0x0A
            0x70, 0x05, // ADD v0, 0x05
        ]);

        vm.step().unwrap();
        vm.step().unwrap();

        assert_eq!(v(&vm, 0), 0x0F);
        assert_eq!(pc(&vm), MEM_START + 4);
    }

    #[test]
    #[rustfmt::skip]
    fn test_add_byte_wraps_without_flag() {
        let mut vm = vm_with(&[
            0x6F, 0x07, // LD vF, 7
            0x60, 0xFF, // LD v0, 0xFF
            0x70, 0x02, // ADD v0, 2
        ]);
        vm.run_steps(3).unwrap();

        assert_eq!(v(&vm, 0), 0x01);
        assert_eq!(v(&vm, 0xF), 7);
    }

    #[test]
    #[rustfmt::skip]
    fn test_add_with_carry() {
        let mut vm = vm_with(&[
            0x60, 0xFF, // LD v0, 0xFF
            0x61, 0x02, // LD v1, 0x02
            0x80, 0x14, // ADD v0, v1
            0x62, 0x10, // LD v2, 0x10
            0x82, 0x14, // ADD v2, v1
        ]);

        vm.run_steps(3).unwrap();
        assert_eq!(v(&vm, 0), 0x01);
        assert_eq!(v(&vm, 0xF), 1);

        // Flag is overwritten, not accumulated.
        vm.run_steps(2).unwrap();
        assert_eq!(v(&vm, 2), 0x12);
        assert_eq!(v(&vm, 0xF), 0);
    }

    #[test]
    #[rustfmt::skip]
    fn test_sub_borrow() {
        let mut vm = vm_with(&[
            0x60, 0x05, // LD v0, 5
            0x61, 0x03, // LD v1, 3
            0x80, 0x15, // SUB v0, v1
            0x62, 0x03, // LD v2, 3
            0x63, 0x05, // LD v3, 5
            0x82, 0x35, // SUB v2, v3
        ]);

        vm.run_steps(3).unwrap();
        assert_eq!(v(&vm, 0), 0x02);
        assert_eq!(v(&vm, 0xF), 1, "no borrow");

        vm.run_steps(3).unwrap();
        assert_eq!(v(&vm, 2), 0xFE);
        assert_eq!(v(&vm, 0xF), 0, "borrow occurred");
    }

    #[test]
    #[rustfmt::skip]
    fn test_sub_equal_operands_has_no_borrow() {
        let mut vm = vm_with(&[
            0x60, 0x05, // LD v0, 5
            0x61, 0x05, // LD v1, 5
            0x80, 0x15, // SUB v0, v1
        ]);
        vm.run_steps(3).unwrap();

        assert_eq!(v(&vm, 0), 0);
        assert_eq!(v(&vm, 0xF), 1);
    }

    #[test]
    #[rustfmt::skip]
    fn test_subn() {
        let mut vm = vm_with(&[
            0x60, 0x03, // LD v0, 3
            0x61, 0x05, // LD v1, 5
            0x80, 0x17, // SUBN v0, v1
            0x62, 0x05, // LD v2, 5
            0x63, 0x03, // LD v3, 3
            0x82, 0x37, // SUBN v2, v3
        ]);

        vm.run_steps(3).unwrap();
        assert_eq!(v(&vm, 0), 0x02);
        assert_eq!(v(&vm, 0xF), 1);

        vm.run_steps(3).unwrap();
        assert_eq!(v(&vm, 2), 0xFE);
        assert_eq!(v(&vm, 0xF), 0);
    }

    /// When VF is the destination, the flag overwrites the result.
    #[test]
    #[rustfmt::skip]
    fn test_flag_wins_over_result() {
        let mut vm = vm_with(&[
            0x6F, 0xFF, // LD vF, 0xFF
            0x61, 0x02, // LD v1, 2
            0x8F, 0x14, // ADD vF, v1
        ]);
        vm.run_steps(3).unwrap();

        assert_eq!(v(&vm, 0xF), 1);
    }

    #[test]
    #[rustfmt::skip]
    fn test_logic_ops() {
        let mut vm = vm_with(&[
            0x60, 0b1100, // LD v0, 0b1100
            0x61, 0b1010, // LD v1, 0b1010
            0x6F, 0x01,   // LD vF, 1
            0x82, 0x00,   // LD v2, v0
            0x82, 0x11,   // OR v2, v1
            0x83, 0x00,   // LD v3, v0
            0x83, 0x12,   // AND v3, v1
            0x84, 0x00,   // LD v4, v0
            0x84, 0x13,   // XOR v4, v1
        ]);
        vm.run_steps(9).unwrap();

        assert_eq!(v(&vm, 2), 0b1110);
        assert_eq!(v(&vm, 3), 0b1000);
        assert_eq!(v(&vm, 4), 0b0110);
        assert_eq!(v(&vm, 0xF), 0, "logic ops reset VF on the COSMAC VIP");
    }

    #[test]
    #[rustfmt::skip]
    fn test_logic_ops_keep_flag_on_chip48() {
        let mut vm = vm_with_quirks(&[
            0x6F, 0x01, // LD vF, 1
            0x80, 0x11, // OR v0, v1
        ], Quirks::chip48());
        vm.run_steps(2).unwrap();

        assert_eq!(v(&vm, 0xF), 1);
    }

    #[test]
    #[rustfmt::skip]
    fn test_shift_reads_vy() {
        let mut vm = vm_with(&[
            0x60, 0xFF,       // LD v0, 0xFF
            0x61, 0b1000_0001, // LD v1, 0x81
            0x80, 0x16,       // SHR v0, v1
            0x82, 0x1E,       // SHL v2, v1
        ]);

        vm.run_steps(3).unwrap();
        assert_eq!(v(&vm, 0), 0b0100_0000);
        assert_eq!(v(&vm, 0xF), 1);

        vm.step().unwrap();
        assert_eq!(v(&vm, 2), 0b0000_0010);
        assert_eq!(v(&vm, 0xF), 1);
    }

    #[test]
    #[rustfmt::skip]
    fn test_shift_in_place() {
        let mut vm = vm_with_quirks(&[
            0x60, 0b0000_0110, // LD v0, 6
            0x61, 0xFF,        // LD v1, 0xFF
            0x80, 0x16,        // SHR v0
            0x80, 0x1E,        // SHL v0
        ], Quirks::chip48());

        vm.run_steps(3).unwrap();
        assert_eq!(v(&vm, 0), 0b0000_0011);
        assert_eq!(v(&vm, 0xF), 0);

        vm.step().unwrap();
        assert_eq!(v(&vm, 0), 0b0000_0110);
        assert_eq!(v(&vm, 0xF), 0);
    }

    #[test]
    #[rustfmt::skip]
    fn test_skips() {
        let mut vm = vm_with(&[
            0x60, 0x42, // 200: LD v0, 0x42
            0x30, 0x42, // 202: SE v0, 0x42     ; skips
            0x00, 0x00, // 204:
            0x40, 0x42, // 206: SNE v0, 0x42    ; no skip
            0x61, 0x42, // 208: LD v1, 0x42
            0x50, 0x10, // 20A: SE v0, v1       ; skips
            0x00, 0x00, // 20C:
            0x90, 0x10, // 20E: SNE v0, v1      ; no skip
            0x00, 0x00, // 210:
        ]);

        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(pc(&vm), 0x206);
        vm.step().unwrap();
        assert_eq!(pc(&vm), 0x208);
        vm.step().unwrap();
        vm.step().unwrap();
        assert_eq!(pc(&vm), 0x20E);
        vm.step().unwrap();
        assert_eq!(pc(&vm), 0x210);
    }

    #[test]
    #[rustfmt::skip]
    fn test_call_and_return() {
        let mut vm = vm_with(&[
            0x22, 0x06, // 200: CALL 0x206
            0x61, 0x01, // 202: LD v1, 1
            0x12, 0x02, // 204: JP 0x202
            0x60, 0x07, // 206: LD v0, 7
            0x00, 0xEE, // 208: RET
        ]);

        assert_eq!(vm.step(), Ok(Flow::Jump));
        assert_eq!(pc(&vm), 0x206);
        assert_eq!(vm.cpu.stack.peek(), Some(0x202));

        vm.step().unwrap();
        assert_eq!(vm.step(), Ok(Flow::Jump));
        assert_eq!(pc(&vm), 0x202);
        assert!(vm.cpu.stack.is_empty());
        assert_eq!(v(&vm, 0), 7);
    }

    #[test]
    fn test_return_underflow() {
        let mut vm = vm_with(&[0x00, 0xEE]); // RET

        assert_eq!(vm.step(), Err(Chip8Error::StackUnderflow));
        assert_eq!(pc(&vm), MEM_START);
    }

    #[test]
    fn test_call_overflow() {
        // CALL 0x200, recursing forever.
        let mut vm = vm_with(&[0x22, 0x00]);

        for _ in 0..STACK_SIZE {
            vm.step().unwrap();
        }

        assert_eq!(vm.step(), Err(Chip8Error::StackOverflow));
        assert_eq!(pc(&vm), MEM_START);
        assert_eq!(vm.cpu.stack.depth(), STACK_SIZE);
    }

    #[test]
    #[rustfmt::skip]
    fn test_jump_v0() {
        let mut vm = vm_with(&[
            0x60, 0x04, // LD v0, 4
            0x61, 0x08, // LD v1, 8
            0xB1, 0x00, // JP v0, 0x100
        ]);
        vm.run_steps(3).unwrap();
        assert_eq!(pc(&vm), 0x104);

        let mut vm = vm_with_quirks(&[
            0x60, 0x04, // LD v0, 4
            0x61, 0x08, // LD v1, 8
            0xB1, 0x00, // JP v1, 0x100
        ], Quirks::chip48());
        vm.run_steps(3).unwrap();
        assert_eq!(pc(&vm), 0x108);
    }

    #[test]
    fn test_jump_v0_past_end_of_memory() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0xFF, // LD v0, 0xFF
            0xBF, 0xFF, // JP v0, 0xFFF
        ]);
        vm.step().unwrap();

        assert_eq!(
            vm.step(),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x10FE })
        );
        assert_eq!(pc(&vm), 0x202);
    }

    #[test]
    fn test_random_is_masked_and_seeded() {
        #[rustfmt::skip]
        let program = [
            0xC0, 0x0F, // RND v0, 0x0F
            0xC1, 0xFF, // RND v1, 0xFF
            0xC2, 0x00, // RND v2, 0
        ];

        let mut a = vm_with(&program);
        let mut b = vm_with(&program);
        a.run_steps(3).unwrap();
        b.run_steps(3).unwrap();

        assert!(v(&a, 0) <= 0x0F);
        assert_eq!(v(&a, 2), 0);
        assert_eq!(a.cpu.registers, b.cpu.registers);
    }

    #[test]
    #[rustfmt::skip]
    fn test_draw_same_sprite_twice() {
        let mut vm = vm_with(&[
            0xA2, 0x0A, // 200: LD I, 0x20A
            0xD0, 0x12, // 202: DRW v0, v1, 2
            0xD0, 0x12, // 204: DRW v0, v1, 2
            0x12, 0x06, // 206: JP 0x206
            0x00, 0x00, // 208:
            0xFF, 0x81, // 20A: sprite
        ]);

        vm.step().unwrap();
        assert_eq!(vm.step(), Ok(Flow::Draw));
        assert_eq!(v(&vm, 0xF), 0);
        assert_eq!(vm.framebuffer().iter().filter(|px| **px).count(), 10);

        vm.step().unwrap();
        assert_eq!(v(&vm, 0xF), 1);
        assert!(vm.framebuffer().iter().all(|px| !px));
    }

    /// Draw two pixels next to each other.
    /// The zero bits of the second draw must not erase
    /// the pixels of the first draw.
    #[test]
    #[rustfmt::skip]
    fn test_draw_collision() {
        let mut vm = vm_with(&[
            0xA2, 0x0C, // 200: LD I, .sprite
            0x60, 0x04, // 202: LD v0, 4
            0x61, 0x00, // 204: LD v1, 0
            0xD0, 0x11, // 206: DRW v0, v1, 1
            0x60, 0x00, // 208: LD v0, 0
            0xD0, 0x11, // 20A: DRW v0, v1, 1
            0b11110000, // 20C: .sprite
            0b00000000,
        ]);
        vm.run_steps(6).unwrap();

        assert!(vm.framebuffer()[0]); // sprite 2
        assert!(vm.framebuffer()[4]); // sprite 1
        assert_eq!(v(&vm, 0xF), 0);
    }

    #[test]
    fn test_draw_wraps_sprites_on_quirk() {
        #[rustfmt::skip]
        let program = [
            0xA2, 0x0A, // 200: LD I, .sprite
            0x60, 0x3C, // 202: LD v0, 60
            0x61, 0x1F, // 204: LD v1, 31
            0xD0, 0x12, // 206: DRW v0, v1, 2
            0x12, 0x08, // 208: JP 0x208
            0xFF, 0xFF, // 20A: .sprite
        ];
        let lit = |vm: &Chip8Vm| vm.framebuffer().iter().filter(|px| **px).count();

        // Bottom right corner only.
        let mut vm = vm_with(&program);
        vm.run_steps(4).unwrap();
        assert_eq!(lit(&vm), 4);
        assert!(!vm.framebuffer()[0]);

        // Spills into all four corners.
        let quirks = Quirks {
            wrap_sprites: true,
            ..Quirks::default()
        };
        let mut vm = vm_with_quirks(&program, quirks);
        vm.run_steps(4).unwrap();
        assert_eq!(lit(&vm), 16);
        assert!(vm.framebuffer()[0]);
        assert!(vm.framebuffer()[60]);
        assert!(vm.framebuffer()[3 + 31 * DISPLAY_WIDTH]);
        assert_eq!(v(&vm, 0xF), 0);
    }

    #[test]
    fn test_draw_out_of_memory() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0xAF, 0xFE, // LD I, 0xFFE
            0x6F, 0x07, // LD vF, 7
            0xD0, 0x05, // DRW v0, v0, 5
        ]);
        vm.run_steps(2).unwrap();

        assert_eq!(
            vm.step(),
            Err(Chip8Error::MemoryOutOfBounds { address: MEM_SIZE })
        );
        assert_eq!(pc(&vm), MEM_START + 4);
        assert_eq!(v(&vm, 0xF), 7);
        assert!(vm.framebuffer().iter().all(|px| !px));
    }

    #[test]
    #[rustfmt::skip]
    fn test_clear_screen() {
        let mut vm = vm_with(&[
            0xF0, 0x29, // LD F, v0
            0xD0, 0x05, // DRW v0, v0, 5
            0x00, 0xE0, // CLS
        ]);
        vm.run_steps(2).unwrap();
        assert!(vm.framebuffer().iter().any(|px| *px));

        assert_eq!(vm.step(), Ok(Flow::Draw));
        assert!(vm.framebuffer().iter().all(|px| !px));
    }

    #[test]
    #[rustfmt::skip]
    fn test_font_address() {
        let mut vm = vm_with(&[
            0x60, 0x0B, // LD v0, 0xB
            0xF0, 0x29, // LD F, v0
            0x61, 0x1A, // LD v1, 0x1A
            0xF1, 0x29, // LD F, v1   ; only the lower nibble counts
        ]);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers.index(), FONTSET_START + 0xB * 5);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers.index(), FONTSET_START + 0xA * 5);
    }

    #[test]
    #[rustfmt::skip]
    fn test_bcd() {
        let mut vm = vm_with(&[
            0xA3, 0x00, // LD I, 0x300
            0x60, 0xFE, // LD v0, 254
            0xF0, 0x33, // LD B, v0
        ]);
        vm.run_steps(3).unwrap();

        assert_eq!(vm.cpu.ram.read_slice(0x300, 3).unwrap(), &[2, 5, 4]);
        assert_eq!(vm.cpu.registers.index(), 0x300);
    }

    #[test]
    #[rustfmt::skip]
    fn test_bcd_out_of_memory() {
        let mut vm = vm_with(&[
            0xAF, 0xFE, // LD I, 0xFFE
            0x60, 0x7B, // LD v0, 123
            0xF0, 0x33, // LD B, v0
        ]);
        vm.run_steps(2).unwrap();

        assert!(matches!(vm.step(), Err(Chip8Error::MemoryOutOfBounds { .. })));
        assert_eq!(vm.cpu.ram.read_slice(0xFFE, 2).unwrap(), &[0, 0]);
    }

    #[test]
    #[rustfmt::skip]
    fn test_store_and_load_registers() {
        let mut vm = vm_with(&[
            0x60, 0x11, // LD v0, 0x11
            0x61, 0x22, // LD v1, 0x22
            0x62, 0x33, // LD v2, 0x33
            0xA3, 0x00, // LD I, 0x300
            0xF2, 0x55, // LD [I], v2
            0xA3, 0x01, // LD I, 0x301
            0xF1, 0x65, // LD v1, [I]
        ]);

        vm.run_steps(5).unwrap();
        assert_eq!(vm.cpu.ram.read_slice(0x300, 4).unwrap(), &[0x11, 0x22, 0x33, 0x00]);
        assert_eq!(vm.cpu.registers.index(), 0x303);

        vm.run_steps(2).unwrap();
        assert_eq!(v(&vm, 0), 0x22);
        assert_eq!(v(&vm, 1), 0x33);
        assert_eq!(v(&vm, 2), 0x33);
        assert_eq!(vm.cpu.registers.index(), 0x303);
    }

    #[test]
    #[rustfmt::skip]
    fn test_store_registers_keeps_index_on_chip48() {
        let mut vm = vm_with_quirks(&[
            0xA3, 0x00, // LD I, 0x300
            0xF3, 0x55, // LD [I], v3
            0xF3, 0x65, // LD v3, [I]
        ], Quirks::chip48());

        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers.index(), 0x300);
    }

    #[test]
    #[rustfmt::skip]
    fn test_add_index() {
        let mut vm = vm_with(&[
            0x6F, 0x05, // LD vF, 5
            0x60, 0x10, // LD v0, 0x10
            0xAF, 0xF8, // LD I, 0xFF8
            0xF0, 0x1E, // ADD I, v0
        ]);
        vm.run_steps(4).unwrap();

        assert_eq!(vm.cpu.registers.index(), 0x008);
        assert_eq!(v(&vm, 0xF), 5);
    }

    #[test]
    #[rustfmt::skip]
    fn test_timers() {
        let mut vm = vm_with(&[
            0x60, 0x05, // LD v0, 5
            0xF0, 0x15, // LD DT, v0
            0xF0, 0x18, // LD ST, v0
            0xF1, 0x07, // LD v1, DT
        ]);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.step(), Ok(Flow::Sound));
        assert_eq!(vm.delay_timer(), 5);
        assert!(vm.is_buzzing());

        vm.tick_timers();
        vm.tick_timers();
        vm.step().unwrap();
        assert_eq!(v(&vm, 1), 3);
        assert_eq!(vm.sound_timer(), 3);

        for _ in 0..10 {
            vm.tick_timers();
        }
        assert_eq!(vm.delay_timer(), 0);
        assert_eq!(vm.sound_timer(), 0);
        assert!(!vm.is_buzzing());
    }

    #[test]
    #[rustfmt::skip]
    fn test_skip_key() {
        let mut vm = vm_with(&[
            0x60, 0x1A, // 200: LD v0, 0x1A   ; key A, upper nibble ignored
            0xE0, 0x9E, // 202: SKP v0
            0xE0, 0xA1, // 204: SKNP v0
            0xE0, 0x9E, // 206: SKP v0
        ]);
        vm.step().unwrap();

        vm.step().unwrap();
        assert_eq!(pc(&vm), 0x204);
        vm.step().unwrap();
        assert_eq!(pc(&vm), 0x208);

        vm.set_key(0xA, true).unwrap();
        vm.cpu.registers.set_pc(0x206);
        vm.step().unwrap();
        assert_eq!(pc(&vm), 0x20A);
    }

    /// Fx0A (LD Vx, K)
    ///
    /// Wait for a keypress, then store the key value in Vx.
    /// The VM must stall while waiting, and signal the state to the outer executer.
    #[test]
    #[rustfmt::skip]
    fn test_key_wait() {
        let mut vm = vm_with(&[
            0xF1, 0x0A, // LD v1, K
            0x62, 0x42  // LD v2, 0x42  ; sentinal
        ]);

        // machine must stall
        for _ in 0..6 {
            assert_eq!(vm.step(), Ok(Flow::KeyWait));
            assert_eq!(pc(&vm), MEM_START);
            assert!(vm.is_key_waiting());
        }

        // timers keep running while stalled
        vm.cpu.timers.set_delay(2);
        vm.tick_timers();
        assert_eq!(vm.delay_timer(), 1);

        // machine has yielded, waiting for any key to be pressed.
        vm.set_key(0x5, true).unwrap();

        // machine will now advance
        assert_eq!(vm.step(), Ok(Flow::Ok));
        assert_eq!(pc(&vm), MEM_START + 2);
        assert!(!vm.is_key_waiting());
        assert_eq!(v(&vm, 1), 0x05);

        // Ensure the machine is continuing
        vm.step().unwrap();
        assert_eq!(pc(&vm), MEM_START + 4);
        assert_eq!(v(&vm, 2), 0x42); // sentinal
    }

    #[test]
    fn test_key_wait_ignores_held_key() {
        let mut vm = vm_with(&[0xF1, 0x0A]); // LD v1, K
        vm.set_key(0x7, true).unwrap();

        assert_eq!(vm.step(), Ok(Flow::KeyWait));
        assert_eq!(vm.step(), Ok(Flow::KeyWait));

        vm.set_key(0x7, false).unwrap();
        assert_eq!(vm.step(), Ok(Flow::KeyWait));

        vm.set_key(0x7, true).unwrap();
        assert_eq!(vm.step(), Ok(Flow::Ok));
        assert_eq!(v(&vm, 1), 0x7);
    }

    #[test]
    fn test_reset_discards_key_wait() {
        let mut vm = vm_with(&[0xF1, 0x0A]); // LD v1, K
        assert_eq!(vm.step(), Ok(Flow::KeyWait));

        vm.restart().unwrap();
        assert!(!vm.is_key_waiting());
    }

    #[test]
    fn test_invalid_opcode() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x01, // LD v0, 1
            0x80, 0x18, // invalid
        ]);
        vm.step().unwrap();

        assert_eq!(
            vm.step(),
            Err(Chip8Error::InvalidOpcode {
                opcode: 0x8018,
                address: 0x202
            })
        );
        assert_eq!(pc(&vm), 0x202);
        assert_eq!(v(&vm, 0), 1);

        // The fault is sticky: the machine won't move past it.
        assert!(vm.step().is_err());
        assert_eq!(pc(&vm), 0x202);
    }

    #[test]
    fn test_sys_is_ignored() {
        let mut vm = vm_with(&[0x01, 0x23]); // SYS 0x123

        assert_eq!(vm.step(), Ok(Flow::Ok));
        assert_eq!(pc(&vm), MEM_START + 2);
    }

    #[test]
    fn test_jump_past_end_of_memory() {
        let mut vm = vm_with(&[0x1F, 0xFF]); // JP 0xFFF

        assert_eq!(
            vm.step(),
            Err(Chip8Error::MemoryOutOfBounds { address: 0xFFF })
        );
        assert_eq!(pc(&vm), MEM_START);

        let mut vm = vm_with(&[0x2F, 0xFF]); // CALL 0xFFF

        assert!(vm.step().is_err());
        assert!(vm.cpu.stack.is_empty());
    }

    /// Program that jumps to the last two instructions in memory.
    fn vm_with_tail(tail: [u8; 4]) -> Chip8Vm {
        let mut rom = vec![0; MAX_PROGRAM_SIZE];
        rom[..2].copy_from_slice(&[0x1F, 0xFC]); // JP 0xFFC
        rom[MAX_PROGRAM_SIZE - 4..].copy_from_slice(&tail);
        vm_with(&rom)
    }

    #[test]
    #[rustfmt::skip]
    fn test_skip_past_end_of_memory() {
        let mut vm = vm_with_tail([
            0x30, 0x00, // FFC: SE v0, 0   ; skips
            0x00, 0x00, // FFE:
        ]);
        vm.step().unwrap();

        assert_eq!(
            vm.step(),
            Err(Chip8Error::MemoryOutOfBounds { address: MEM_SIZE })
        );
        assert_eq!(pc(&vm), 0xFFC);

        let mut vm = vm_with_tail([
            0x40, 0x00, // FFC: SNE v0, 0  ; no skip
            0x00, 0x00, // FFE:
        ]);
        vm.run_steps(2).unwrap();
        assert_eq!(pc(&vm), 0xFFE);
    }

    #[test]
    #[rustfmt::skip]
    fn test_last_instruction_cannot_fall_through() {
        let mut vm = vm_with_tail([
            0x00, 0x00, // FFC:
            0x60, 0x01, // FFE: LD v0, 1
        ]);
        vm.cpu.registers.set_pc(0xFFE);

        assert_eq!(
            vm.step(),
            Err(Chip8Error::MemoryOutOfBounds { address: MEM_SIZE })
        );
        assert_eq!(pc(&vm), 0xFFE);
        assert_eq!(v(&vm, 0), 0);

        // Jumps out of the last slot are fine.
        let mut vm = vm_with_tail([
            0x00, 0x00, // FFC:
            0x12, 0x00, // FFE: JP 0x200
        ]);
        vm.cpu.registers.set_pc(0xFFE);
        assert_eq!(vm.step(), Ok(Flow::Jump));
        assert_eq!(pc(&vm), MEM_START);
    }

    #[test]
    fn test_return_to_end_of_memory() {
        let mut vm = vm_with(&[0x00, 0xEE]); // RET
        vm.cpu.stack.push(0x1000).unwrap();

        assert_eq!(
            vm.step(),
            Err(Chip8Error::MemoryOutOfBounds { address: MEM_SIZE })
        );
        assert_eq!(pc(&vm), MEM_START);
        assert_eq!(vm.cpu.stack.depth(), 1);
    }
}
