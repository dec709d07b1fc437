//! `collections` module lowering.
//!
//! All collections share a 40-byte header `{len, cap, head, tail,
//! data_ptr}` allocated together with the data region by `mmap(2)`
//! (anonymous pages arrive zeroed, so states start empty). Capacities
//! are rounded to powers of two, minimum 8. Hash map and set keep a
//! states byte-array (0 empty, 1 occupied, 2 tombstone) after the data
//! in the same allocation; probing is linear over the splitmix64-mixed
//! key; growth triggers at `len*10 >= cap*7` by doubling and rehashing
//! occupied slots, dropping tombstones. Removal writes a tombstone and
//! insertion reuses the first tombstone seen on the probe path.
//!
//! Header offsets: len 0, cap 8, head 16, tail 24, data_ptr 32.

use crate::codegen::CodeGen;
use lotusc_par::Expr;

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_collections(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            // Allocation: array, stack and heap use plain 8-byte
            // slots; queue/deque too (the ring indices live in the
            // header); map pairs 16 bytes + 1 state byte; set 8 + 1.
            "array_new" | "stack_new" | "heap_new" | "queue_new" | "deque_new" => {
                self.require_helper(".lotus_coll_new", helper_coll_new);
                self.gen_single(args);
                self.emit("movq %rax, %rdi");
                self.emit("movq $8, %rsi");
                self.emit("call .lotus_coll_new");
            }
            "map_new" => {
                self.require_helper(".lotus_coll_new", helper_coll_new);
                self.gen_single(args);
                self.emit("movq %rax, %rdi");
                self.emit("movq $17, %rsi");
                self.emit("call .lotus_coll_new");
            }
            "set_new" => {
                self.require_helper(".lotus_coll_new", helper_coll_new);
                self.gen_single(args);
                self.emit("movq %rax, %rdi");
                self.emit("movq $9, %rsi");
                self.emit("call .lotus_coll_new");
            }

            "array_push" | "stack_push" => {
                self.require_helper(".lotus_array_push", helper_array_push);
                self.gen_user_call(".lotus_array_push", args);
            }
            "array_pop" | "stack_pop" => {
                self.require_helper(".lotus_array_pop", helper_array_pop);
                self.gen_user_call(".lotus_array_pop", args);
            }
            "array_get" => {
                self.require_helper(".lotus_array_get", helper_array_get);
                self.gen_user_call(".lotus_array_get", args);
            }
            "array_set" => {
                self.require_helper(".lotus_array_set", helper_array_set);
                self.gen_user_call(".lotus_array_set", args);
            }
            "stack_peek" => {
                let empty = self.ctx.fresh_label("peek_empty");
                let end = self.ctx.fresh_label("peek_end");
                self.gen_single(args);
                self.emit("movq 0(%rax), %rcx");
                self.emit("testq %rcx, %rcx");
                self.emit(&format!("jz {}", empty));
                self.emit("movq 32(%rax), %rdx");
                self.emit("movq -8(%rdx,%rcx,8), %rax");
                self.emit(&format!("jmp {}", end));
                self.emit_label(&empty);
                self.emit("movq $-1, %rax");
                self.emit_label(&end);
            }

            "queue_push" | "deque_push_back" => {
                self.require_helper(".lotus_ring_grow", helper_ring_grow);
                self.require_helper(".lotus_queue_push", helper_queue_push);
                self.gen_user_call(".lotus_queue_push", args);
            }
            "queue_pop" | "deque_pop_front" => {
                self.require_helper(".lotus_queue_pop", helper_queue_pop);
                self.gen_user_call(".lotus_queue_pop", args);
            }
            "deque_push_front" => {
                self.require_helper(".lotus_ring_grow", helper_ring_grow);
                self.require_helper(".lotus_deque_push_front", helper_deque_push_front);
                self.gen_user_call(".lotus_deque_push_front", args);
            }
            "deque_pop_back" => {
                self.require_helper(".lotus_deque_pop_back", helper_deque_pop_back);
                self.gen_user_call(".lotus_deque_pop_back", args);
            }

            "heap_push" => {
                self.require_helper(".lotus_array_push", helper_array_push);
                self.require_helper(".lotus_heap_push", helper_heap_push);
                self.gen_user_call(".lotus_heap_push", args);
            }
            "heap_pop" => {
                self.require_helper(".lotus_heap_pop", helper_heap_pop);
                self.gen_user_call(".lotus_heap_pop", args);
            }
            "heap_peek" => {
                let empty = self.ctx.fresh_label("heap_peek_empty");
                let end = self.ctx.fresh_label("heap_peek_end");
                self.gen_single(args);
                self.emit("movq 0(%rax), %rcx");
                self.emit("testq %rcx, %rcx");
                self.emit(&format!("jz {}", empty));
                self.emit("movq 32(%rax), %rdx");
                self.emit("movq (%rdx), %rax");
                self.emit(&format!("jmp {}", end));
                self.emit_label(&empty);
                self.emit("movq $-1, %rax");
                self.emit_label(&end);
            }

            "map_put" => {
                self.require_helper(".lotus_hash_mix", helper_hash_mix);
                self.require_helper(".lotus_map_grow", helper_map_grow);
                self.require_helper(".lotus_map_put", helper_map_put);
                self.gen_user_call(".lotus_map_put", args);
            }
            "map_get" => {
                self.require_helper(".lotus_hash_mix", helper_hash_mix);
                self.require_helper(".lotus_map_get", helper_map_get);
                self.gen_user_call(".lotus_map_get", args);
            }
            "map_remove" => {
                self.require_helper(".lotus_hash_mix", helper_hash_mix);
                self.require_helper(".lotus_map_remove", helper_map_remove);
                self.gen_user_call(".lotus_map_remove", args);
            }
            "set_add" => {
                self.require_helper(".lotus_hash_mix", helper_hash_mix);
                self.require_helper(".lotus_set_grow", helper_set_grow);
                self.require_helper(".lotus_set_add", helper_set_add);
                self.gen_user_call(".lotus_set_add", args);
            }
            "set_contains" => {
                self.require_helper(".lotus_hash_mix", helper_hash_mix);
                self.require_helper(".lotus_set_probe", helper_set_probe);
                self.require_helper(".lotus_set_contains", helper_set_contains);
                self.gen_user_call(".lotus_set_contains", args);
            }
            "set_remove" => {
                self.require_helper(".lotus_hash_mix", helper_hash_mix);
                self.require_helper(".lotus_set_probe", helper_set_probe);
                self.require_helper(".lotus_set_remove", helper_set_remove);
                self.gen_user_call(".lotus_set_remove", args);
            }

            "array_len" | "stack_len" | "queue_len" | "deque_len" | "heap_len" | "map_len"
            | "set_len" => {
                self.gen_single(args);
                self.emit("movq 0(%rax), %rax");
            }

            "binary_search" => {
                self.require_helper(".lotus_binary_search", helper_binary_search);
                self.gen_user_call(".lotus_binary_search", args);
            }
            _ => return false,
        }
        true
    }
}

/// Shared allocator: requested capacity in `%rdi`, slot bytes in
/// `%rsi`. Rounds the capacity to a power of two (minimum 8), maps
/// `40 + cap*slot` anonymous bytes and fills the header.
fn helper_coll_new(_gen: &mut CodeGen) -> String {
    "\
.lotus_coll_new:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    pushq %r13
    movq %rsi, %r13
    movq $8, %r12
.lotus_coll_new_round:
    cmpq %rdi, %r12
    jge .lotus_coll_new_alloc
    salq $1, %r12
    jmp .lotus_coll_new_round
.lotus_coll_new_alloc:
    movq %r12, %rsi
    imulq %r13, %rsi
    addq $40, %rsi
    movq $9, %rax
    xorq %rdi, %rdi
    movq $3, %rdx
    movq $34, %r10
    movq $-1, %r8
    xorq %r9, %r9
    syscall
    movq $0, 0(%rax)
    movq %r12, 8(%rax)
    movq $0, 16(%rax)
    movq $0, 24(%rax)
    leaq 40(%rax), %rdx
    movq %rdx, 32(%rax)
    popq %r13
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Append to a dynamic array: collection in `%rdi`, value in `%rsi`.
/// Doubles the data region when full (the old region stays mapped;
/// only `munmap` returns pages in this model).
fn helper_array_push(_gen: &mut CodeGen) -> String {
    "\
.lotus_array_push:
    pushq %rbp
    movq %rsp, %rbp
    movq 0(%rdi), %rax
    cmpq 8(%rdi), %rax
    jl .lotus_array_push_store
    pushq %rdi
    pushq %rsi
    movq 8(%rdi), %rsi
    salq $4, %rsi
    movq $9, %rax
    xorq %rdi, %rdi
    movq $3, %rdx
    movq $34, %r10
    movq $-1, %r8
    xorq %r9, %r9
    syscall
    movq %rax, %rdx
    popq %rsi
    popq %rdi
    movq 32(%rdi), %r8
    movq 0(%rdi), %rcx
    xorq %r9, %r9
.lotus_array_push_copy:
    cmpq %rcx, %r9
    jge .lotus_array_push_swap
    movq (%r8,%r9,8), %r10
    movq %r10, (%rdx,%r9,8)
    incq %r9
    jmp .lotus_array_push_copy
.lotus_array_push_swap:
    movq %rdx, 32(%rdi)
    salq $1, 8(%rdi)
    movq 0(%rdi), %rax
.lotus_array_push_store:
    movq 32(%rdi), %rdx
    movq %rsi, (%rdx,%rax,8)
    incq 0(%rdi)
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Remove and return the last element, -1 when empty.
fn helper_array_pop(_gen: &mut CodeGen) -> String {
    "\
.lotus_array_pop:
    movq 0(%rdi), %rcx
    testq %rcx, %rcx
    jz .lotus_array_pop_empty
    decq %rcx
    movq %rcx, 0(%rdi)
    movq 32(%rdi), %rdx
    movq (%rdx,%rcx,8), %rax
    ret
.lotus_array_pop_empty:
    movq $-1, %rax
    ret
"
    .to_string()
}

/// Bounds-checked read: collection in `%rdi`, index in `%rsi`; -1 out
/// of range.
fn helper_array_get(_gen: &mut CodeGen) -> String {
    "\
.lotus_array_get:
    cmpq 0(%rdi), %rsi
    jge .lotus_array_get_oob
    testq %rsi, %rsi
    js .lotus_array_get_oob
    movq 32(%rdi), %rdx
    movq (%rdx,%rsi,8), %rax
    ret
.lotus_array_get_oob:
    movq $-1, %rax
    ret
"
    .to_string()
}

/// Bounds-checked write: collection, index, value.
fn helper_array_set(_gen: &mut CodeGen) -> String {
    "\
.lotus_array_set:
    cmpq 0(%rdi), %rsi
    jge .lotus_array_set_oob
    testq %rsi, %rsi
    js .lotus_array_set_oob
    movq 32(%rdi), %rax
    movq %rdx, (%rax,%rsi,8)
    movq %rsi, %rax
    ret
.lotus_array_set_oob:
    movq $-1, %rax
    ret
"
    .to_string()
}

/// Double a ring buffer, unrolling it so the live elements start at
/// index 0 (head = 0, tail = len).
fn helper_ring_grow(_gen: &mut CodeGen) -> String {
    "\
.lotus_ring_grow:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    pushq %r13
    pushq %r14
    pushq %r15
    movq %rdi, %r12
    movq 8(%r12), %r13
    movq %r13, %rsi
    salq $4, %rsi
    movq $9, %rax
    xorq %rdi, %rdi
    movq $3, %rdx
    movq $34, %r10
    movq $-1, %r8
    xorq %r9, %r9
    syscall
    movq %rax, %r14
    movq 32(%r12), %r15
    xorq %rcx, %rcx
.lotus_ring_grow_copy:
    cmpq 0(%r12), %rcx
    jge .lotus_ring_grow_swap
    movq 16(%r12), %rax
    addq %rcx, %rax
    movq %r13, %rdx
    decq %rdx
    andq %rdx, %rax
    movq (%r15,%rax,8), %rdx
    movq %rdx, (%r14,%rcx,8)
    incq %rcx
    jmp .lotus_ring_grow_copy
.lotus_ring_grow_swap:
    movq %r14, 32(%r12)
    salq $1, 8(%r12)
    movq $0, 16(%r12)
    movq 0(%r12), %rax
    movq %rax, 24(%r12)
    popq %r15
    popq %r14
    popq %r13
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Ring push at the tail: collection in `%rdi`, value in `%rsi`.
fn helper_queue_push(_gen: &mut CodeGen) -> String {
    "\
.lotus_queue_push:
    pushq %rbp
    movq %rsp, %rbp
    movq 0(%rdi), %rax
    cmpq 8(%rdi), %rax
    jl .lotus_queue_push_store
    pushq %rdi
    pushq %rsi
    call .lotus_ring_grow
    popq %rsi
    popq %rdi
.lotus_queue_push_store:
    movq 32(%rdi), %rdx
    movq 24(%rdi), %rax
    movq %rsi, (%rdx,%rax,8)
    incq %rax
    movq 8(%rdi), %rcx
    decq %rcx
    andq %rcx, %rax
    movq %rax, 24(%rdi)
    incq 0(%rdi)
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Ring pop from the head; -1 when empty.
fn helper_queue_pop(_gen: &mut CodeGen) -> String {
    "\
.lotus_queue_pop:
    movq 0(%rdi), %rax
    testq %rax, %rax
    jz .lotus_queue_pop_empty
    movq 32(%rdi), %rdx
    movq 16(%rdi), %rcx
    movq (%rdx,%rcx,8), %rax
    incq %rcx
    movq 8(%rdi), %r8
    decq %r8
    andq %r8, %rcx
    movq %rcx, 16(%rdi)
    decq 0(%rdi)
    ret
.lotus_queue_pop_empty:
    movq $-1, %rax
    ret
"
    .to_string()
}

/// Ring push before the head.
fn helper_deque_push_front(_gen: &mut CodeGen) -> String {
    "\
.lotus_deque_push_front:
    pushq %rbp
    movq %rsp, %rbp
    movq 0(%rdi), %rax
    cmpq 8(%rdi), %rax
    jl .lotus_deque_push_front_store
    pushq %rdi
    pushq %rsi
    call .lotus_ring_grow
    popq %rsi
    popq %rdi
.lotus_deque_push_front_store:
    movq 16(%rdi), %rax
    decq %rax
    movq 8(%rdi), %rcx
    decq %rcx
    andq %rcx, %rax
    movq %rax, 16(%rdi)
    movq 32(%rdi), %rdx
    movq %rsi, (%rdx,%rax,8)
    incq 0(%rdi)
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Ring pop from the tail; -1 when empty.
fn helper_deque_pop_back(_gen: &mut CodeGen) -> String {
    "\
.lotus_deque_pop_back:
    movq 0(%rdi), %rax
    testq %rax, %rax
    jz .lotus_deque_pop_back_empty
    movq 24(%rdi), %rax
    decq %rax
    movq 8(%rdi), %rcx
    decq %rcx
    andq %rcx, %rax
    movq %rax, 24(%rdi)
    movq 32(%rdi), %rdx
    movq (%rdx,%rax,8), %rax
    decq 0(%rdi)
    ret
.lotus_deque_pop_back_empty:
    movq $-1, %rax
    ret
"
    .to_string()
}

/// Min-heap insert: append then sift up against `(i-1)/2`.
fn helper_heap_push(_gen: &mut CodeGen) -> String {
    "\
.lotus_heap_push:
    pushq %rbp
    movq %rsp, %rbp
    call .lotus_array_push
    movq 0(%rdi), %rcx
    decq %rcx
    movq 32(%rdi), %rdx
.lotus_heap_push_sift:
    testq %rcx, %rcx
    jz .lotus_heap_push_done
    movq %rcx, %r8
    decq %r8
    shrq $1, %r8
    movq (%rdx,%rcx,8), %rax
    movq (%rdx,%r8,8), %r9
    cmpq %r9, %rax
    jge .lotus_heap_push_done
    movq %r9, (%rdx,%rcx,8)
    movq %rax, (%rdx,%r8,8)
    movq %r8, %rcx
    jmp .lotus_heap_push_sift
.lotus_heap_push_done:
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Min-heap extract: swap the last element to the root and sift down;
/// -1 when empty.
fn helper_heap_pop(_gen: &mut CodeGen) -> String {
    "\
.lotus_heap_pop:
    movq 0(%rdi), %rax
    testq %rax, %rax
    jz .lotus_heap_pop_empty
    movq 32(%rdi), %rdx
    movq (%rdx), %r8
    decq 0(%rdi)
    movq 0(%rdi), %rcx
    movq (%rdx,%rcx,8), %r9
    movq %r9, (%rdx)
    xorq %rcx, %rcx
.lotus_heap_pop_sift:
    leaq 1(%rcx,%rcx), %r9
    movq 0(%rdi), %r10
    cmpq %r10, %r9
    jge .lotus_heap_pop_done
    movq %rcx, %r11
    movq (%rdx,%r11,8), %rax
    cmpq %rax, (%rdx,%r9,8)
    jge .lotus_heap_pop_right
    movq %r9, %r11
.lotus_heap_pop_right:
    leaq 2(%rcx,%rcx), %r9
    cmpq %r10, %r9
    jge .lotus_heap_pop_swap
    movq (%rdx,%r11,8), %rax
    cmpq %rax, (%rdx,%r9,8)
    jge .lotus_heap_pop_swap
    movq %r9, %r11
.lotus_heap_pop_swap:
    cmpq %rcx, %r11
    je .lotus_heap_pop_done
    movq (%rdx,%rcx,8), %rax
    movq (%rdx,%r11,8), %r9
    movq %r9, (%rdx,%rcx,8)
    movq %rax, (%rdx,%r11,8)
    movq %r11, %rcx
    jmp .lotus_heap_pop_sift
.lotus_heap_pop_done:
    movq %r8, %rax
    ret
.lotus_heap_pop_empty:
    movq $-1, %rax
    ret
"
    .to_string()
}

/// The splitmix64-style finalizing mixer: key in `%rdi`, hash in
/// `%rax`.
fn helper_hash_mix(_gen: &mut CodeGen) -> String {
    "\
.lotus_hash_mix:
    movq %rdi, %rax
    movq %rax, %rdx
    shrq $33, %rdx
    xorq %rdx, %rax
    movabsq $0xff51afd7ed558ccd, %rdx
    imulq %rdx, %rax
    movq %rax, %rdx
    shrq $33, %rdx
    xorq %rdx, %rax
    movabsq $0xc4ceb9fe1a85ec53, %rdx
    imulq %rdx, %rax
    movq %rax, %rdx
    shrq $33, %rdx
    xorq %rdx, %rax
    ret
"
    .to_string()
}

/// Map insert/update: map in `%rdi`, key in `%rsi`, value in `%rdx`.
/// Grows first when `len*10 >= cap*7`; linear probe; the first
/// tombstone on the path is reused for a fresh key.
fn helper_map_put(_gen: &mut CodeGen) -> String {
    "\
.lotus_map_put:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    pushq %r13
    pushq %r14
    movq %rdi, %r12
    movq %rsi, %r13
    movq %rdx, %r14
    movq 0(%r12), %rax
    imulq $10, %rax, %rax
    movq 8(%r12), %rcx
    imulq $7, %rcx, %rcx
    cmpq %rcx, %rax
    jl .lotus_map_put_insert
    movq %r12, %rdi
    call .lotus_map_grow
.lotus_map_put_insert:
    movq %r13, %rdi
    call .lotus_hash_mix
    movq 8(%r12), %rcx
    decq %rcx
    andq %rcx, %rax
    movq 32(%r12), %rdx
    movq 8(%r12), %r8
    salq $4, %r8
    leaq (%rdx,%r8), %r9
    movq $-1, %r10
.lotus_map_put_probe:
    movzbq (%r9,%rax), %r8
    testq %r8, %r8
    jz .lotus_map_put_empty
    cmpq $2, %r8
    je .lotus_map_put_tombstone
    movq %rax, %r8
    salq $4, %r8
    cmpq %r13, (%rdx,%r8)
    je .lotus_map_put_update
    jmp .lotus_map_put_next
.lotus_map_put_tombstone:
    cmpq $-1, %r10
    jne .lotus_map_put_next
    movq %rax, %r10
.lotus_map_put_next:
    incq %rax
    andq %rcx, %rax
    jmp .lotus_map_put_probe
.lotus_map_put_empty:
    cmpq $-1, %r10
    je .lotus_map_put_slot
    movq %r10, %rax
.lotus_map_put_slot:
    movb $1, (%r9,%rax)
    movq %rax, %r8
    salq $4, %r8
    movq %r13, (%rdx,%r8)
    movq %r14, 8(%rdx,%r8)
    incq 0(%r12)
    jmp .lotus_map_put_done
.lotus_map_put_update:
    movq %rax, %r8
    salq $4, %r8
    movq %r14, 8(%rdx,%r8)
.lotus_map_put_done:
    popq %r14
    popq %r13
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Double the map and reinsert every occupied slot into the fresh
/// (zeroed) table; tombstones are dropped on the way.
fn helper_map_grow(_gen: &mut CodeGen) -> String {
    "\
.lotus_map_grow:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    pushq %r13
    pushq %r14
    pushq %r15
    movq %rdi, %r12
    movq 8(%r12), %r13
    movq %r13, %rsi
    salq $1, %rsi
    movq %rsi, %rax
    salq $4, %rax
    addq %rsi, %rax
    movq %rax, %rsi
    movq $9, %rax
    xorq %rdi, %rdi
    movq $3, %rdx
    movq $34, %r10
    movq $-1, %r8
    xorq %r9, %r9
    syscall
    movq %rax, %r14
    movq 32(%r12), %r15
    xorq %rcx, %rcx
.lotus_map_grow_loop:
    cmpq %r13, %rcx
    jge .lotus_map_grow_swap
    movq %r13, %rax
    salq $4, %rax
    leaq (%r15,%rax), %rdx
    movzbq (%rdx,%rcx), %rax
    cmpq $1, %rax
    jne .lotus_map_grow_next
    movq %rcx, %rax
    salq $4, %rax
    movq (%r15,%rax), %rdi
    movq 8(%r15,%rax), %r8
    pushq %rcx
    pushq %r8
    call .lotus_hash_mix
    popq %r8
    popq %rcx
    movq %r13, %rdx
    salq $1, %rdx
    decq %rdx
    andq %rdx, %rax
    movq %r13, %r9
    salq $5, %r9
    leaq (%r14,%r9), %r9
.lotus_map_grow_probe:
    movzbq (%r9,%rax), %r10
    testq %r10, %r10
    jz .lotus_map_grow_store
    incq %rax
    andq %rdx, %rax
    jmp .lotus_map_grow_probe
.lotus_map_grow_store:
    movb $1, (%r9,%rax)
    movq %rax, %r10
    salq $4, %r10
    movq %rdi, (%r14,%r10)
    movq %r8, 8(%r14,%r10)
.lotus_map_grow_next:
    incq %rcx
    jmp .lotus_map_grow_loop
.lotus_map_grow_swap:
    movq %r14, 32(%r12)
    salq $1, 8(%r12)
    popq %r15
    popq %r14
    popq %r13
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Map lookup: value for the key, or the sentinel -1. Tombstones keep
/// the probe walking; an empty state ends it.
fn helper_map_get(_gen: &mut CodeGen) -> String {
    "\
.lotus_map_get:
    movq %rdi, %r10
    movq %rsi, %r9
    movq %rsi, %rdi
    call .lotus_hash_mix
    movq 8(%r10), %rcx
    decq %rcx
    andq %rcx, %rax
    movq 32(%r10), %rdx
    movq 8(%r10), %r8
    salq $4, %r8
    leaq (%rdx,%r8), %r8
.lotus_map_get_probe:
    movzbq (%r8,%rax), %rdi
    testq %rdi, %rdi
    jz .lotus_map_get_missing
    cmpq $1, %rdi
    jne .lotus_map_get_next
    movq %rax, %rdi
    salq $4, %rdi
    cmpq %r9, (%rdx,%rdi)
    jne .lotus_map_get_next
    movq 8(%rdx,%rdi), %rax
    ret
.lotus_map_get_next:
    incq %rax
    andq %rcx, %rax
    jmp .lotus_map_get_probe
.lotus_map_get_missing:
    movq $-1, %rax
    ret
"
    .to_string()
}

/// Map removal: tombstone the slot, decrement len; returns the removed
/// value or -1.
fn helper_map_remove(_gen: &mut CodeGen) -> String {
    "\
.lotus_map_remove:
    movq %rdi, %r10
    movq %rsi, %r9
    movq %rsi, %rdi
    call .lotus_hash_mix
    movq 8(%r10), %rcx
    decq %rcx
    andq %rcx, %rax
    movq 32(%r10), %rdx
    movq 8(%r10), %r8
    salq $4, %r8
    leaq (%rdx,%r8), %r8
.lotus_map_remove_probe:
    movzbq (%r8,%rax), %rdi
    testq %rdi, %rdi
    jz .lotus_map_remove_missing
    cmpq $1, %rdi
    jne .lotus_map_remove_next
    movq %rax, %rdi
    salq $4, %rdi
    cmpq %r9, (%rdx,%rdi)
    jne .lotus_map_remove_next
    movb $2, (%r8,%rax)
    decq 0(%r10)
    movq 8(%rdx,%rdi), %rax
    ret
.lotus_map_remove_next:
    incq %rax
    andq %rcx, %rax
    jmp .lotus_map_remove_probe
.lotus_map_remove_missing:
    movq $-1, %rax
    ret
"
    .to_string()
}

/// Set insert: like map_put over 8-byte slots; returns 1 when the key
/// was new, 0 when it was already present.
fn helper_set_add(_gen: &mut CodeGen) -> String {
    "\
.lotus_set_add:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    pushq %r13
    movq %rdi, %r12
    movq %rsi, %r13
    movq 0(%r12), %rax
    imulq $10, %rax, %rax
    movq 8(%r12), %rcx
    imulq $7, %rcx, %rcx
    cmpq %rcx, %rax
    jl .lotus_set_add_insert
    movq %r12, %rdi
    call .lotus_set_grow
.lotus_set_add_insert:
    movq %r13, %rdi
    call .lotus_hash_mix
    movq 8(%r12), %rcx
    decq %rcx
    andq %rcx, %rax
    movq 32(%r12), %rdx
    movq 8(%r12), %r8
    salq $3, %r8
    leaq (%rdx,%r8), %r9
    movq $-1, %r10
.lotus_set_add_probe:
    movzbq (%r9,%rax), %r8
    testq %r8, %r8
    jz .lotus_set_add_empty
    cmpq $2, %r8
    je .lotus_set_add_tombstone
    cmpq %r13, (%rdx,%rax,8)
    je .lotus_set_add_present
    jmp .lotus_set_add_next
.lotus_set_add_tombstone:
    cmpq $-1, %r10
    jne .lotus_set_add_next
    movq %rax, %r10
.lotus_set_add_next:
    incq %rax
    andq %rcx, %rax
    jmp .lotus_set_add_probe
.lotus_set_add_empty:
    cmpq $-1, %r10
    je .lotus_set_add_slot
    movq %r10, %rax
.lotus_set_add_slot:
    movb $1, (%r9,%rax)
    movq %r13, (%rdx,%rax,8)
    incq 0(%r12)
    movq $1, %rax
    jmp .lotus_set_add_done
.lotus_set_add_present:
    movq $0, %rax
.lotus_set_add_done:
    popq %r13
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Double the set and reinsert occupied slots.
fn helper_set_grow(_gen: &mut CodeGen) -> String {
    "\
.lotus_set_grow:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    pushq %r13
    pushq %r14
    pushq %r15
    movq %rdi, %r12
    movq 8(%r12), %r13
    movq %r13, %rsi
    salq $1, %rsi
    movq %rsi, %rax
    salq $3, %rax
    addq %rsi, %rax
    movq %rax, %rsi
    movq $9, %rax
    xorq %rdi, %rdi
    movq $3, %rdx
    movq $34, %r10
    movq $-1, %r8
    xorq %r9, %r9
    syscall
    movq %rax, %r14
    movq 32(%r12), %r15
    xorq %rcx, %rcx
.lotus_set_grow_loop:
    cmpq %r13, %rcx
    jge .lotus_set_grow_swap
    movq %r13, %rax
    salq $3, %rax
    leaq (%r15,%rax), %rdx
    movzbq (%rdx,%rcx), %rax
    cmpq $1, %rax
    jne .lotus_set_grow_next
    movq (%r15,%rcx,8), %rdi
    pushq %rcx
    call .lotus_hash_mix
    popq %rcx
    movq %r13, %rdx
    salq $1, %rdx
    decq %rdx
    andq %rdx, %rax
    movq %r13, %r9
    salq $4, %r9
    leaq (%r14,%r9), %r9
.lotus_set_grow_probe:
    movzbq (%r9,%rax), %r10
    testq %r10, %r10
    jz .lotus_set_grow_store
    incq %rax
    andq %rdx, %rax
    jmp .lotus_set_grow_probe
.lotus_set_grow_store:
    movb $1, (%r9,%rax)
    movq %rdi, (%r14,%rax,8)
.lotus_set_grow_next:
    incq %rcx
    jmp .lotus_set_grow_loop
.lotus_set_grow_swap:
    movq %r14, 32(%r12)
    salq $1, 8(%r12)
    popq %r15
    popq %r14
    popq %r13
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Shared probe for contains/remove: set in `%rdi`, key in `%rsi`;
/// returns the slot index in `%rax` or -1, with the states base left
/// in `%r8`.
fn helper_set_probe(_gen: &mut CodeGen) -> String {
    "\
.lotus_set_probe:
    movq %rdi, %r10
    movq %rsi, %r9
    movq %rsi, %rdi
    call .lotus_hash_mix
    movq 8(%r10), %rcx
    decq %rcx
    andq %rcx, %rax
    movq 32(%r10), %rdx
    movq 8(%r10), %r8
    salq $3, %r8
    leaq (%rdx,%r8), %r8
.lotus_set_probe_loop:
    movzbq (%r8,%rax), %rdi
    testq %rdi, %rdi
    jz .lotus_set_probe_missing
    cmpq $1, %rdi
    jne .lotus_set_probe_next
    cmpq %r9, (%rdx,%rax,8)
    je .lotus_set_probe_found
.lotus_set_probe_next:
    incq %rax
    andq %rcx, %rax
    jmp .lotus_set_probe_loop
.lotus_set_probe_missing:
    movq $-1, %rax
.lotus_set_probe_found:
    ret
"
    .to_string()
}

/// Membership test built on the probe.
fn helper_set_contains(_gen: &mut CodeGen) -> String {
    "\
.lotus_set_contains:
    pushq %rbp
    movq %rsp, %rbp
    call .lotus_set_probe
    cmpq $0, %rax
    setge %al
    movzbq %al, %rax
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Tombstone removal built on the probe; returns 1 when a key was
/// removed.
fn helper_set_remove(_gen: &mut CodeGen) -> String {
    "\
.lotus_set_remove:
    pushq %rbp
    movq %rsp, %rbp
    pushq %rdi
    call .lotus_set_probe
    popq %rdi
    cmpq $0, %rax
    jl .lotus_set_remove_missing
    movb $2, (%r8,%rax)
    decq 0(%rdi)
    movq $1, %rax
    jmp .lotus_set_remove_done
.lotus_set_remove_missing:
    movq $0, %rax
.lotus_set_remove_done:
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Lower-bound binary search over a sorted dynamic array: collection
/// in `%rdi`, target in `%rsi`; match index or -1.
fn helper_binary_search(_gen: &mut CodeGen) -> String {
    "\
.lotus_binary_search:
    movq 32(%rdi), %rdx
    xorq %rcx, %rcx
    movq 0(%rdi), %r8
.lotus_binary_search_loop:
    cmpq %r8, %rcx
    jge .lotus_binary_search_after
    movq %rcx, %r9
    addq %r8, %r9
    shrq $1, %r9
    movq (%rdx,%r9,8), %rax
    cmpq %rsi, %rax
    jge .lotus_binary_search_high
    leaq 1(%r9), %rcx
    jmp .lotus_binary_search_loop
.lotus_binary_search_high:
    movq %r9, %r8
    jmp .lotus_binary_search_loop
.lotus_binary_search_after:
    cmpq 0(%rdi), %rcx
    jge .lotus_binary_search_miss
    movq (%rdx,%rcx,8), %rax
    cmpq %rsi, %rax
    jne .lotus_binary_search_miss
    movq %rcx, %rax
    ret
.lotus_binary_search_miss:
    movq $-1, %rax
    ret
"
    .to_string()
}

#[cfg(test)]
mod tests {
    use crate::codegen::CodeGen;
    use lotusc_lex::Lexer;
    use lotusc_par::Parser;
    use lotusc_util::Handler;

    fn gen(source: &str) -> String {
        let handler = Handler::new();
        let tokens = Lexer::new(source, &handler).tokenize();
        let ast = Parser::new(tokens, &handler).parse().expect("parse");
        CodeGen::new(&handler).generate(&ast)
    }

    #[test]
    fn test_map_scenario_emits_probe_machinery() {
        let source = "use \"collections\";\nint m = map_new(4);\nmap_put(m, 7, 42);\nmap_put(m, 23, 99);\nint a = map_get(m, 7);\nint b = map_get(m, 23);\nint c = map_get(m, 5);";
        let asm = gen(source);
        assert!(asm.contains(".lotus_coll_new:"));
        assert!(asm.contains(".lotus_hash_mix:"));
        assert!(asm.contains(".lotus_map_put:"));
        assert!(asm.contains(".lotus_map_get:"));
        // splitmix64 mixing constants
        assert!(asm.contains("movabsq $0xff51afd7ed558ccd, %rdx"));
        assert!(asm.contains("movabsq $0xc4ceb9fe1a85ec53, %rdx"));
        // growth policy: len*10 >= cap*7
        assert!(asm.contains("imulq $10, %rax, %rax"));
        assert!(asm.contains("imulq $7, %rcx, %rcx"));
        // missing key sentinel
        assert!(asm.contains(".lotus_map_get_missing:\n    movq $-1, %rax"));
    }

    #[test]
    fn test_map_remove_writes_tombstone() {
        let asm = gen("use \"collections\";\nint m = map_new(4);\nmap_put(m, 1, 2);\nmap_remove(m, 1);");
        assert!(asm.contains("movb $2, (%r8,%rax)"));
        assert!(asm.contains("decq 0(%r10)"));
    }

    #[test]
    fn test_len_is_inline_header_read() {
        let asm = gen("use \"collections\";\nint m = map_new(4);\nint n = map_len(m);");
        assert!(asm.contains("movq 0(%rax), %rax"));
        // no helper call for len
        assert!(!asm.contains(".lotus_map_len"));
    }

    #[test]
    fn test_array_push_doubles_when_full() {
        let asm = gen("use \"collections\";\nint a = array_new(2);\narray_push(a, 1);");
        assert!(asm.contains(".lotus_array_push:"));
        assert!(asm.contains("salq $1, 8(%rdi)"));
    }

    #[test]
    fn test_stack_aliases_array_helpers() {
        let asm = gen(
            "use \"collections\";\nint s = stack_new(4);\nstack_push(s, 1);\nint v = stack_pop(s);",
        );
        assert!(asm.contains("call .lotus_array_push"));
        assert!(asm.contains("call .lotus_array_pop"));
    }

    #[test]
    fn test_queue_ring_wraps_with_mask() {
        let asm = gen(
            "use \"collections\";\nint q = queue_new(4);\nqueue_push(q, 1);\nint v = queue_pop(q);",
        );
        assert!(asm.contains(".lotus_queue_push:"));
        assert!(asm.contains(".lotus_ring_grow:"));
        // power-of-two wrap: tail = (tail+1) & (cap-1)
        assert!(asm.contains("andq %rcx, %rax"));
    }

    #[test]
    fn test_deque_ends() {
        let asm = gen("use \"collections\";\nint d = deque_new(4);\ndeque_push_front(d, 1);\ndeque_push_back(d, 2);\nint a = deque_pop_front(d);\nint b = deque_pop_back(d);");
        assert!(asm.contains(".lotus_deque_push_front:"));
        assert!(asm.contains(".lotus_deque_pop_back:"));
        assert!(asm.contains("call .lotus_queue_push"));
        assert!(asm.contains("call .lotus_queue_pop"));
    }

    #[test]
    fn test_heap_sifts() {
        let asm = gen(
            "use \"collections\";\nint h = heap_new(8);\nheap_push(h, 5);\nint m = heap_pop(h);",
        );
        assert!(asm.contains(".lotus_heap_push:"));
        assert!(asm.contains(".lotus_heap_pop:"));
        // parent index (i-1)/2 and children 2i+1 / 2i+2
        assert!(asm.contains("shrq $1, %r8"));
        assert!(asm.contains("leaq 1(%rcx,%rcx), %r9"));
        assert!(asm.contains("leaq 2(%rcx,%rcx), %r9"));
    }

    #[test]
    fn test_set_surface() {
        let asm = gen("use \"collections\";\nint s = set_new(8);\nset_add(s, 3);\nbool has = set_contains(s, 3);\nset_remove(s, 3);");
        assert!(asm.contains(".lotus_set_add:"));
        assert!(asm.contains(".lotus_set_probe:"));
        assert!(asm.contains(".lotus_set_contains:"));
        assert!(asm.contains(".lotus_set_remove:"));
    }

    #[test]
    fn test_binary_search_lower_bound() {
        let asm = gen("use \"collections\";\nint a = array_new(8);\nint i = binary_search(a, 42);");
        assert!(asm.contains(".lotus_binary_search:"));
        assert!(asm.contains(".lotus_binary_search_miss:\n    movq $-1, %rax"));
    }
}
