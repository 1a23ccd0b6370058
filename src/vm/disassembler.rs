//! Bytecode disassembler for debug output.

use crate::value::Value;
use crate::vm::chunk::{Chunk, Function};
use crate::vm::opcode::Op;

/// Disassemble a function to a human-readable listing, recursing into the
/// functions in its constant pool.
pub fn disassemble(function: &Function) -> String {
    let mut out = String::new();
    let name = if function.name.is_empty() {
        "<script>"
    } else {
        &function.name
    };
    out.push_str(&format!(
        "== {} (arity={}, upvalues={}) ==\n",
        name, function.arity, function.upvalue_count
    ));
    disassemble_chunk(&function.chunk, &mut out);

    for constant in &function.chunk.constants {
        if let Value::Function(nested) = constant {
            out.push('\n');
            out.push_str(&disassemble(nested));
        }
    }
    out
}

fn disassemble_chunk(chunk: &Chunk, out: &mut String) {
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, out);
    }
}

fn disassemble_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let line = chunk.lines.get(offset).copied().unwrap_or(0);
    let line_str = if offset > 0 && chunk.lines.get(offset - 1).copied() == Some(line) {
        "   |".to_string()
    } else {
        format!("{:4}", line)
    };
    out.push_str(&format!("{:04} {} ", offset, line_str));

    let Ok(op) = Op::try_from(chunk.code[offset]) else {
        out.push_str(&format!("BAD_OPCODE {}\n", chunk.code[offset]));
        return offset + 1;
    };

    match op {
        Op::Constant => constant_instruction("CONSTANT", chunk, offset, out),
        Op::Null => simple("NULL", offset, out),
        Op::True => simple("TRUE", offset, out),
        Op::False => simple("FALSE", offset, out),
        Op::Pop => simple("POP", offset, out),
        Op::Copy => simple("COPY", offset, out),
        Op::DefineGlobal => constant_instruction("DEFINE_GLOBAL", chunk, offset, out),
        Op::GetGlobal => constant_instruction("GET_GLOBAL", chunk, offset, out),
        Op::SetGlobal => constant_instruction("SET_GLOBAL", chunk, offset, out),
        Op::GetLocal => byte_instruction("GET_LOCAL", chunk, offset, out),
        Op::SetLocal => byte_instruction("SET_LOCAL", chunk, offset, out),
        Op::GetUpvalue => byte_instruction("GET_UPVALUE", chunk, offset, out),
        Op::SetUpvalue => byte_instruction("SET_UPVALUE", chunk, offset, out),
        Op::GetProperty => constant_instruction("GET_PROPERTY", chunk, offset, out),
        Op::SetProperty => constant_instruction("SET_PROPERTY", chunk, offset, out),
        Op::GetIndex => simple("GET_INDEX", offset, out),
        Op::SetIndex => simple("SET_INDEX", offset, out),
        Op::Add => simple("ADD", offset, out),
        Op::Subtract => simple("SUBTRACT", offset, out),
        Op::Multiply => simple("MULTIPLY", offset, out),
        Op::Divide => simple("DIVIDE", offset, out),
        Op::Modulo => simple("MODULO", offset, out),
        Op::Negate => simple("NEGATE", offset, out),
        Op::Not => simple("NOT", offset, out),
        Op::Equal => simple("EQUAL", offset, out),
        Op::Greater => simple("GREATER", offset, out),
        Op::Less => simple("LESS", offset, out),
        Op::BitwiseAnd => simple("BITWISE_AND", offset, out),
        Op::BitwiseOr => simple("BITWISE_OR", offset, out),
        Op::BitwiseXor => simple("BITWISE_XOR", offset, out),
        Op::LeftShift => simple("LEFT_SHIFT", offset, out),
        Op::RightShift => simple("RIGHT_SHIFT", offset, out),
        Op::Jump => jump_instruction("JUMP", 1, chunk, offset, out),
        Op::JumpIfFalse => jump_instruction("JUMP_IF_FALSE", 1, chunk, offset, out),
        Op::Loop => jump_instruction("LOOP", -1, chunk, offset, out),
        Op::ForEachNext => jump_instruction("FOR_EACH_NEXT", 1, chunk, offset, out),
        Op::BuildList => byte_instruction("BUILD_LIST", chunk, offset, out),
        Op::BuildMap => byte_instruction("BUILD_MAP", chunk, offset, out),
        Op::BuildRangeList => simple("BUILD_RANGE_LIST", offset, out),
        Op::Call => byte_instruction("CALL", chunk, offset, out),
        Op::Closure => closure_instruction(chunk, offset, out),
        Op::Return => simple("RETURN", offset, out),
        Op::Class => constant_instruction("CLASS", chunk, offset, out),
        Op::Inherit => simple("INHERIT", offset, out),
        Op::Method => constant_instruction("METHOD", chunk, offset, out),
        Op::Panic => simple("PANIC", offset, out),
        Op::Attempt => jump_instruction("ATTEMPT", 1, chunk, offset, out),
        Op::EndAttempt => simple("END_ATTEMPT", offset, out),
        Op::Import => simple("IMPORT", offset, out),
    }
}

fn simple(name: &str, offset: usize, out: &mut String) -> usize {
    out.push_str(name);
    out.push('\n');
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let operand = chunk.code.get(offset + 1).copied().unwrap_or(0);
    out.push_str(&format!("{:<16} {:>4}\n", name, operand));
    offset + 2
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let index = chunk.code.get(offset + 1).copied().unwrap_or(0) as usize;
    let rendered = match chunk.constants.get(index) {
        Some(Value::String(s)) => format!("\"{}\"", s),
        Some(value) => value.to_string(),
        None => "???".to_string(),
    };
    out.push_str(&format!("{:<16} {:>4} ({})\n", name, index, rendered));
    offset + 2
}

fn jump_instruction(name: &str, sign: i64, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let high = chunk.code.get(offset + 1).copied().unwrap_or(0) as u16;
    let low = chunk.code.get(offset + 2).copied().unwrap_or(0) as u16;
    let jump = ((high << 8) | low) as i64;
    let target = offset as i64 + 3 + sign * jump;
    out.push_str(&format!("{:<16} {:>4} -> {}\n", name, jump, target));
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let index = chunk.code.get(offset + 1).copied().unwrap_or(0) as usize;
    let mut next = offset + 2;
    match chunk.constants.get(index) {
        Some(Value::Function(function)) => {
            out.push_str(&format!(
                "{:<16} {:>4} (<function {}>)\n",
                "CLOSURE", index, function.name
            ));
            for _ in 0..function.upvalue_count {
                let is_local = chunk.code.get(next).copied().unwrap_or(0);
                let slot = chunk.code.get(next + 1).copied().unwrap_or(0);
                out.push_str(&format!(
                    "{:04}    |   {} {}\n",
                    next,
                    if is_local == 1 { "local" } else { "upvalue" },
                    slot
                ));
                next += 2;
            }
        }
        _ => out.push_str(&format!("{:<16} {:>4} (???)\n", "CLOSURE", index)),
    }
    next
}
