// Copyright 2026 Vexpr Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Chunked program execution
//!
//! One run call moves through: validate inputs -> plan broadcast ->
//! allocate output and scratch -> chunk loop. All shape and kind errors
//! surface before any output element is written. Each worker owns a private
//! register file of chunk buffers; the only cross-thread state is the
//! reduction accumulator, merged once after the join.

use std::borrow::Cow;

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::compiler::program::CompiledExpression;
use crate::compiler::registers::NO_REG;
use crate::core::array::{ArrayData, NdArray};
use crate::core::error::{Error, Result};
use crate::core::scalar::ScalarValue;

use super::broadcast::{broadcast_shapes, broadcast_strides, contiguous_strides, StridedIter};
use super::buffers::ChunkBuf;
use super::kernels::{self, Decoded};
use super::threads::{get_num_threads, range_size, CHUNK_SIZE, PARALLEL_THRESHOLD};

/// Per-input gather plan
struct InputPlan {
    /// Element strides lifted into the loop shape (0 on broadcast axes)
    strides: Vec<usize>,
    /// True when the input is dense over the whole loop shape
    contiguous: bool,
    /// True when some instruction actually reads this input register
    used: bool,
}

/// Everything a worker needs, shared read-only across threads
struct Plan<'a> {
    prog: &'a CompiledExpression,
    inputs: &'a [Cow<'a, NdArray>],
    input_plans: Vec<InputPlan>,
    steps: Vec<Decoded>,
    loop_shape: Vec<usize>,
    /// Source register of the trailing reduction instruction, if any
    reduce_src: Option<usize>,
}

/// Mutable view over one worker's slice of the output buffer
enum OutSlice<'a> {
    Bool(&'a mut [bool]),
    Int32(&'a mut [i32]),
    Int64(&'a mut [i64]),
    Float32(&'a mut [f32]),
    Float64(&'a mut [f64]),
    Complex128(&'a mut [num_complex::Complex64]),
    Bytes(&'a mut [Vec<u8>]),
}

/// Evaluate a compiled expression against concrete arrays
pub fn run(
    prog: &CompiledExpression,
    inputs: &[&NdArray],
    out: Option<NdArray>,
) -> Result<NdArray> {
    let signature = prog.input_signature();

    // ValidateInputs: arity, then kind (exact or widenable, never narrowed)
    if inputs.len() != signature.len() {
        return Err(Error::value(format!(
            "expression {:?} takes {} input(s), got {}",
            prog.expr(),
            signature.len(),
            inputs.len()
        )));
    }
    let mut checked: Vec<Cow<'_, NdArray>> = Vec::with_capacity(inputs.len());
    for ((name, expected), &array) in signature.iter().zip(inputs) {
        if array.kind() == *expected {
            checked.push(Cow::Borrowed(array));
        } else if array.kind().promotes_to(*expected) {
            checked.push(Cow::Owned(array.widen_to(*expected)?));
        } else {
            return Err(Error::value(format!(
                "input '{}' is {} but the program was compiled for {}",
                name,
                array.kind(),
                expected
            )));
        }
    }

    // PlanBroadcast
    let shapes: Vec<&[usize]> = checked.iter().map(|a| a.shape()).collect();
    let loop_shape = broadcast_shapes(&shapes)?;
    let total: usize = loop_shape.iter().product();

    let reduction = prog.reduction();
    let result_shape: Vec<usize> = match reduction {
        None => loop_shape.clone(),
        Some(red) => match red.axis {
            None => Vec::new(),
            Some(axis) => {
                if axis >= loop_shape.len() {
                    return Err(Error::value(format!(
                        "axis {} out of range for {}-d input",
                        axis,
                        loop_shape.len()
                    )));
                }
                let mut shape = loop_shape.clone();
                shape.remove(axis);
                shape
            }
        },
    };

    // AllocateOutputAndScratch: validate a caller buffer fully before
    // touching it; allocate otherwise.
    let output_kind = prog.output_kind();
    let mut result = match out {
        Some(buffer) => {
            if buffer.kind() != output_kind {
                return Err(Error::value(format!(
                    "out buffer is {} but the program produces {}",
                    buffer.kind(),
                    output_kind
                )));
            }
            if buffer.shape() != result_shape.as_slice() {
                return Err(Error::shape(buffer.shape(), &result_shape));
            }
            buffer
        }
        None => NdArray::zeros(output_kind, result_shape.clone()),
    };

    if let Some(red) = reduction {
        let init = kernels::reduction_init(red.op, output_kind);
        fill(result.data_mut(), &init);
    }
    if total == 0 {
        return Ok(result);
    }

    let plan = build_plan(prog, &checked, &loop_shape, total)?;

    let threads = get_num_threads();
    let parallel = threads > 1 && total >= PARALLEL_THRESHOLD;

    match reduction {
        None => {
            if parallel {
                let rsize = range_size(total, threads);
                par_chunk_loop(&plan, result.data_mut(), rsize)?;
            } else {
                let mut slice = as_out_slice(result.data_mut());
                chunk_loop(&plan, 0, total, &mut slice)?;
            }
        }
        Some(red) => {
            // Axis-collapsed accumulator strides over the loop shape
            let acc_strides: Vec<usize> = match red.axis {
                None => vec![0; loop_shape.len()],
                Some(axis) => {
                    let result_strides = contiguous_strides(&result_shape);
                    let mut strides = Vec::with_capacity(loop_shape.len());
                    let mut next = 0;
                    for dim in 0..loop_shape.len() {
                        if dim == axis {
                            strides.push(0);
                        } else {
                            strides.push(result_strides[next]);
                            next += 1;
                        }
                    }
                    strides
                }
            };

            if parallel && red.axis.is_none() {
                // Per-thread partials, merged once at the barrier
                let init = kernels::reduction_init(red.op, output_kind);
                let rsize = range_size(total, threads);
                let ranges: Vec<(usize, usize)> = (0..total)
                    .step_by(rsize)
                    .map(|start| (start, (start + rsize).min(total)))
                    .collect();
                let partials = ranges
                    .into_par_iter()
                    .map(|(start, end)| {
                        let mut acc = ArrayData::splat(&init, 1);
                        reduction_loop(&plan, start, end, &mut acc, &acc_strides)?;
                        Ok(acc.get(0))
                    })
                    .collect::<Result<Vec<ScalarValue>>>()?;
                let mut merged = init;
                for partial in partials {
                    merged = kernels::combine_partials(red.op, output_kind, merged, partial)?;
                }
                fill(result.data_mut(), &merged);
            } else {
                // Axis reductions interleave output rows within a chunk
                // range, so they run inline.
                reduction_loop(&plan, 0, total, result.data_mut(), &acc_strides)?;
            }
        }
    }

    Ok(result)
}

/// Decode the program and plan per-input gathers
fn build_plan<'a>(
    prog: &'a CompiledExpression,
    inputs: &'a [Cow<'a, NdArray>],
    loop_shape: &[usize],
    total: usize,
) -> Result<Plan<'a>> {
    let instructions = prog.program();
    let mut steps: Vec<Decoded> = Vec::with_capacity(instructions.len());
    let mut reduce_src = None;

    let mut index = 0;
    while index < instructions.len() {
        let instruction = instructions[index];
        if instruction.op.name().is_reduction() {
            if index + 1 != instructions.len() {
                return Err(Error::internal("reduction must be the final instruction"));
            }
            reduce_src = Some(instruction.arg1 as usize);
            index += 1;
            continue;
        }
        let mut srcs: SmallVec<[usize; 3]> = SmallVec::new();
        if instruction.arg1 != NO_REG {
            srcs.push(instruction.arg1 as usize);
        }
        if instruction.arg2 != NO_REG {
            srcs.push(instruction.arg2 as usize);
        }
        let mut next = index + 1;
        while next < instructions.len() && instructions[next].is_continuation() {
            for reg in [
                instructions[next].dest,
                instructions[next].arg1,
                instructions[next].arg2,
            ] {
                if reg != NO_REG {
                    srcs.push(reg as usize);
                }
            }
            next += 1;
        }
        steps.push(Decoded {
            op: instruction.op,
            dest: instruction.dest as usize,
            srcs,
        });
        index = next;
    }

    // Which input registers are actually read
    let mut used = vec![false; prog.n_registers()];
    for step in &steps {
        for &src in &step.srcs {
            used[src] = true;
        }
    }
    if let Some(src) = reduce_src {
        used[src] = true;
    }

    let out_strides = contiguous_strides(loop_shape);
    let input_plans = inputs
        .iter()
        .enumerate()
        .map(|(position, array)| {
            let strides = broadcast_strides(array.shape(), loop_shape);
            InputPlan {
                contiguous: strides == out_strides && array.len() == total,
                used: used[1 + position],
                strides,
            }
        })
        .collect();

    Ok(Plan {
        prog,
        inputs,
        input_plans,
        steps,
        loop_shape: loop_shape.to_vec(),
        reduce_src,
    })
}

/// Fresh register file for one worker: zeroed chunk buffers, constants
/// splatted once (constant registers are never written)
fn make_registers(prog: &CompiledExpression) -> Vec<ChunkBuf> {
    let n_inputs = prog.input_signature().len();
    let pool = prog.constant_pool();
    (0..prog.n_registers())
        .map(|reg| {
            if reg > n_inputs && reg <= n_inputs + pool.len() {
                ChunkBuf::splat(&pool[reg - 1 - n_inputs], CHUNK_SIZE)
            } else {
                ChunkBuf::new(prog.register_kind(reg as u8), CHUNK_SIZE)
            }
        })
        .collect()
}

/// Materialize one input's chunk into its register buffer
fn gather(
    dst: &mut ChunkBuf,
    src: &ArrayData,
    plan: &InputPlan,
    loop_shape: &[usize],
    start: usize,
    n: usize,
) -> Result<()> {
    macro_rules! gather_kind {
        ($Var:ident) => {{
            let (ChunkBuf::$Var(dv), ArrayData::$Var(sv)) = (dst, src) else {
                return Err(Error::internal("input buffer kind mismatch"));
            };
            if plan.contiguous {
                dv[..n].clone_from_slice(&sv[start..start + n]);
            } else {
                let mut offsets = StridedIter::new(loop_shape, &plan.strides, start);
                for slot in dv[..n].iter_mut() {
                    *slot = sv[offsets.next_offset()].clone();
                }
            }
            Ok(())
        }};
    }
    match src {
        ArrayData::Bool(_) => gather_kind!(Bool),
        ArrayData::Int32(_) => gather_kind!(Int32),
        ArrayData::Int64(_) => gather_kind!(Int64),
        ArrayData::Float32(_) => gather_kind!(Float32),
        ArrayData::Float64(_) => gather_kind!(Float64),
        ArrayData::Complex128(_) => gather_kind!(Complex128),
        ArrayData::Bytes(_) => gather_kind!(Bytes),
    }
}

/// Run all chunks in `[start, end)`, writing register 0 into `out`
fn chunk_loop(plan: &Plan<'_>, start: usize, end: usize, out: &mut OutSlice<'_>) -> Result<()> {
    let mut regs = make_registers(plan.prog);
    let mut pos = start;
    while pos < end {
        let n = CHUNK_SIZE.min(end - pos);
        run_chunk(plan, &mut regs, pos, n)?;
        write_out(out, &regs[0], pos - start, n)?;
        pos += n;
    }
    Ok(())
}

/// Gather inputs and execute the instruction prefix for one chunk
fn run_chunk(plan: &Plan<'_>, regs: &mut [ChunkBuf], pos: usize, n: usize) -> Result<()> {
    for (position, input_plan) in plan.input_plans.iter().enumerate() {
        if !input_plan.used {
            continue;
        }
        gather(
            &mut regs[1 + position],
            plan.inputs[position].data(),
            input_plan,
            &plan.loop_shape,
            pos,
            n,
        )?;
    }
    for step in &plan.steps {
        kernels::execute(step, regs, n)?;
    }
    Ok(())
}

/// Chunk loop for reductions: the accumulator spans the whole output and
/// every chunk folds into it
fn reduction_loop(
    plan: &Plan<'_>,
    start: usize,
    end: usize,
    acc: &mut ArrayData,
    acc_strides: &[usize],
) -> Result<()> {
    let src = plan
        .reduce_src
        .ok_or_else(|| Error::internal("reduction loop without a reduction instruction"))?;
    let op = plan
        .prog
        .reduction()
        .ok_or_else(|| Error::internal("reduction loop without reduction metadata"))?
        .op;
    let mut regs = make_registers(plan.prog);
    let mut pos = start;
    while pos < end {
        let n = CHUNK_SIZE.min(end - pos);
        run_chunk(plan, &mut regs, pos, n)?;
        let mut offsets = StridedIter::new(&plan.loop_shape, acc_strides, pos);
        kernels::fold_reduction(op, acc, &mut offsets, &regs[src], n)?;
        pos += n;
    }
    Ok(())
}

/// Fan the chunk space out over rayon workers, one contiguous range each
fn par_chunk_loop(plan: &Plan<'_>, data: &mut ArrayData, rsize: usize) -> Result<()> {
    macro_rules! par_kind {
        ($vec:expr, $Var:ident) => {
            $vec.par_chunks_mut(rsize)
                .enumerate()
                .try_for_each(|(index, slice)| {
                    let start = index * rsize;
                    let end = start + slice.len();
                    chunk_loop(plan, start, end, &mut OutSlice::$Var(slice))
                })
        };
    }
    match data {
        ArrayData::Bool(v) => par_kind!(v, Bool),
        ArrayData::Int32(v) => par_kind!(v, Int32),
        ArrayData::Int64(v) => par_kind!(v, Int64),
        ArrayData::Float32(v) => par_kind!(v, Float32),
        ArrayData::Float64(v) => par_kind!(v, Float64),
        ArrayData::Complex128(v) => par_kind!(v, Complex128),
        ArrayData::Bytes(v) => par_kind!(v, Bytes),
    }
}

/// Copy the chunk's output register into the result slice
fn write_out(out: &mut OutSlice<'_>, src: &ChunkBuf, offset: usize, n: usize) -> Result<()> {
    match (out, src) {
        (OutSlice::Bool(dv), ChunkBuf::Bool(sv)) => {
            dv[offset..offset + n].clone_from_slice(&sv[..n]);
        }
        (OutSlice::Int32(dv), ChunkBuf::Int32(sv)) => {
            dv[offset..offset + n].clone_from_slice(&sv[..n]);
        }
        (OutSlice::Int64(dv), ChunkBuf::Int64(sv)) => {
            dv[offset..offset + n].clone_from_slice(&sv[..n]);
        }
        (OutSlice::Float32(dv), ChunkBuf::Float32(sv)) => {
            dv[offset..offset + n].clone_from_slice(&sv[..n]);
        }
        (OutSlice::Float64(dv), ChunkBuf::Float64(sv)) => {
            dv[offset..offset + n].clone_from_slice(&sv[..n]);
        }
        (OutSlice::Complex128(dv), ChunkBuf::Complex128(sv)) => {
            dv[offset..offset + n].clone_from_slice(&sv[..n]);
        }
        (OutSlice::Bytes(dv), ChunkBuf::Bytes(sv)) => {
            dv[offset..offset + n].clone_from_slice(&sv[..n]);
        }
        _ => return Err(Error::internal("output buffer kind mismatch")),
    }
    Ok(())
}

/// Whole-buffer view of the result array
fn as_out_slice(data: &mut ArrayData) -> OutSlice<'_> {
    match data {
        ArrayData::Bool(v) => OutSlice::Bool(v),
        ArrayData::Int32(v) => OutSlice::Int32(v),
        ArrayData::Int64(v) => OutSlice::Int64(v),
        ArrayData::Float32(v) => OutSlice::Float32(v),
        ArrayData::Float64(v) => OutSlice::Float64(v),
        ArrayData::Complex128(v) => OutSlice::Complex128(v),
        ArrayData::Bytes(v) => OutSlice::Bytes(v),
    }
}

/// Overwrite every element with one value (reduction accumulator init)
fn fill(data: &mut ArrayData, value: &ScalarValue) {
    match (data, value) {
        (ArrayData::Bool(v), ScalarValue::Bool(x)) => v.fill(*x),
        (ArrayData::Int32(v), ScalarValue::Int32(x)) => v.fill(*x),
        (ArrayData::Int64(v), ScalarValue::Int64(x)) => v.fill(*x),
        (ArrayData::Float32(v), ScalarValue::Float32(x)) => v.fill(*x),
        (ArrayData::Float64(v), ScalarValue::Float64(x)) => v.fill(*x),
        (ArrayData::Complex128(v), ScalarValue::Complex128(x)) => v.fill(*x),
        (ArrayData::Bytes(v), ScalarValue::Bytes(x)) => v.fill(x.clone()),
        _ => debug_assert!(false, "fill value kind does not match buffer"),
    }
}
