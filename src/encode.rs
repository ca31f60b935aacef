//! Codificación binaria de operaciones.
//!
//! Cada operación ocupa uno o dos bytes. El nibble alto selecciona el grupo
//! de instrucción y el nibble bajo lleva el operando si este es menor que
//! [`ARGUMENT_EXTENDED`]. En otro caso el nibble bajo es `0xF` y un segundo
//! byte contiene `operando - 15`. Las operaciones lógicas usan el grupo
//! `0xC` con el nibble bajo como subcódigo. No hay encabezado, prefijo de
//! longitud ni suma de verificación.

use std::io::{self, Write};

use log::debug;
use thiserror::Error;

use crate::ir::{Instruction, Operation};

/// Operandos desde este valor requieren un byte de extensión.
pub const ARGUMENT_EXTENDED: u32 = 0x0F;

/// Máximo operando representable.
pub const ARGUMENT_MAXIMUM: u32 = ARGUMENT_EXTENDED + 0xFF;

const GROUP_OPERATION: u8 = 0x0C;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Argument {argument} of `{instruction}` is out of range, maximum is 270")]
    ArgumentOutOfRange {
        instruction: Instruction,
        argument: u32,
    },

    #[error("I/O error")]
    Io(#[from] io::Error),
}

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unknown instruction group {group:#x} at offset {offset}")]
    UnknownGroup { group: u8, offset: usize },

    #[error("Unknown logic operation {code:#x} at offset {offset}")]
    UnknownOperation { code: u8, offset: usize },

    #[error("Missing extension byte at offset {offset}")]
    Truncated { offset: usize },
}

/// Escribe la codificación de una secuencia y retorna los bytes emitidos.
pub fn emit<W: Write>(operations: &[Operation], output: &mut W) -> Result<usize, EncodeError> {
    let mut written = 0;
    for &operation in operations {
        let (bytes, len) = encode_one(operation)?;
        output.write_all(&bytes[..len])?;
        written += len;
    }

    debug!("encoded {} operations into {} bytes", operations.len(), written);
    Ok(written)
}

/// Codifica una secuencia en memoria.
pub fn encode(operations: &[Operation]) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::with_capacity(operations.len());
    emit(operations, &mut bytes)?;

    Ok(bytes)
}

/// Recupera la secuencia de operaciones de una imagen binaria.
pub fn decode(bytes: &[u8]) -> Result<Vec<Operation>, DecodeError> {
    let mut operations = Vec::new();
    let mut offset = 0;

    while let Some(&byte) = bytes.get(offset) {
        let (group, low) = (byte >> 4, byte & 0x0F);

        let operation = if group == GROUP_OPERATION {
            let instruction = match low {
                0 => Instruction::OperationNot,
                1 => Instruction::OperationAnd,
                2 => Instruction::OperationOr,
                code => return Err(DecodeError::UnknownOperation { code, offset }),
            };

            Operation::logic(instruction)
        } else {
            let instruction = GROUPS
                .get(group as usize)
                .copied()
                .ok_or(DecodeError::UnknownGroup { group, offset })?;

            let argument = if u32::from(low) == ARGUMENT_EXTENDED {
                let extension = bytes
                    .get(offset + 1)
                    .ok_or(DecodeError::Truncated { offset: offset + 1 })?;

                offset += 1;
                ARGUMENT_EXTENDED + u32::from(*extension)
            } else {
                u32::from(low)
            };

            Operation::new(instruction, argument)
        };

        operations.push(operation);
        offset += 1;
    }

    Ok(operations)
}

/// Grupos de E/S, indexados por nibble alto para decodificar.
const GROUPS: [Instruction; 12] = [
    Instruction::ReadOutput,
    Instruction::ReadFlag,
    Instruction::ReadTimer,
    Instruction::ReadInput,
    Instruction::WriteOutput,
    Instruction::WriteFlag,
    Instruction::SetOutput,
    Instruction::SetFlag,
    Instruction::SetTimer,
    Instruction::ResetOutput,
    Instruction::ResetFlag,
    Instruction::ResetTimer,
];

fn encode_one(operation: Operation) -> Result<([u8; 2], usize), EncodeError> {
    use Instruction::*;

    let Operation {
        instruction,
        argument,
    } = operation;

    let group: u8 = match instruction {
        ReadOutput => 0x0,
        ReadFlag => 0x1,
        ReadTimer => 0x2,
        ReadInput => 0x3,
        WriteOutput => 0x4,
        WriteFlag => 0x5,
        SetOutput => 0x6,
        SetFlag => 0x7,
        SetTimer => 0x8,
        ResetOutput => 0x9,
        ResetFlag => 0xA,
        ResetTimer => 0xB,

        // El operando de las operaciones lógicas se ignora
        OperationNot => return Ok(([GROUP_OPERATION << 4, 0], 1)),
        OperationAnd => return Ok(([GROUP_OPERATION << 4 | 1, 0], 1)),
        OperationOr => return Ok(([GROUP_OPERATION << 4 | 2, 0], 1)),
    };

    match argument {
        argument if argument < ARGUMENT_EXTENDED => Ok(([group << 4 | argument as u8, 0], 1)),
        argument if argument <= ARGUMENT_MAXIMUM => {
            let extension = (argument - ARGUMENT_EXTENDED) as u8;
            Ok(([group << 4 | ARGUMENT_EXTENDED as u8, extension], 2))
        }

        argument => Err(EncodeError::ArgumentOutOfRange {
            instruction,
            argument,
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use Instruction::*;

    fn bytes(instruction: Instruction, argument: u32) -> Vec<u8> {
        encode(&[Operation::new(instruction, argument)]).unwrap()
    }

    #[test]
    fn encode_when_argument_below_extension_then_one_byte() {
        assert_eq!(bytes(ReadInput, 14), [0x3E]);
        assert_eq!(bytes(ReadOutput, 0), [0x00]);
        assert_eq!(bytes(ResetTimer, 3), [0xB3]);
    }

    #[test]
    fn encode_when_argument_at_extension_then_two_bytes() {
        assert_eq!(bytes(ReadInput, 15), [0x3F, 0x00]);
        assert_eq!(bytes(WriteFlag, 270), [0x5F, 0xFF]);
    }

    #[test]
    fn encode_when_argument_past_maximum_then_out_of_range() {
        let error = encode(&[Operation::new(SetFlag, 271)]).unwrap_err();

        assert!(matches!(
            error,
            EncodeError::ArgumentOutOfRange {
                instruction: SetFlag,
                argument: 271
            }
        ));
    }

    #[test]
    fn encode_when_logic_then_operation_group() {
        let operations = [
            Operation::logic(OperationNot),
            Operation::logic(OperationAnd),
            Operation::logic(OperationOr),
        ];

        assert_eq!(encode(&operations).unwrap(), [0xC0, 0xC1, 0xC2]);
    }

    #[test]
    fn encode_when_every_group_then_high_nibble_in_order() {
        let high: Vec<u8> = GROUPS
            .iter()
            .map(|&instruction| bytes(instruction, 1)[0] >> 4)
            .collect();

        assert_eq!(high, (0..12).collect::<Vec<u8>>());
    }

    #[test]
    fn emit_when_writer_given_then_counts_bytes() {
        let operations = [Operation::new(ReadFlag, 20), Operation::logic(OperationNot)];
        let mut output = Vec::new();

        assert_eq!(emit(&operations, &mut output).unwrap(), 3);
        assert_eq!(output, [0x1F, 0x05, 0xC0]);
    }

    #[test]
    fn decode_when_encoded_program_then_same_operations() {
        let operations = vec![
            Operation::new(ReadInput, 0),
            Operation::new(ReadTimer, 200),
            Operation::logic(OperationAnd),
            Operation::new(SetOutput, 15),
        ];

        assert_eq!(decode(&encode(&operations).unwrap()), Ok(operations));
    }

    #[test]
    fn decode_when_extension_missing_then_truncated() {
        assert_eq!(decode(&[0x00, 0x4F]), Err(DecodeError::Truncated { offset: 2 }));
    }

    #[test]
    fn decode_when_group_unused_then_unknown_group() {
        assert_eq!(
            decode(&[0xD0]),
            Err(DecodeError::UnknownGroup { group: 0xD, offset: 0 })
        );
    }

    #[test]
    fn decode_when_logic_code_unused_then_unknown_operation() {
        assert_eq!(
            decode(&[0xC1, 0xC7]),
            Err(DecodeError::UnknownOperation { code: 7, offset: 1 })
        );
    }
}
