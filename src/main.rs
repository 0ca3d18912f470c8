use std::ptr;

use coalloc::explicit::globals::{alloc, check, free, init, realloc};

fn main() {
    if !init() {
        eprintln!("heap initialization failed");
        return;
    }

    let message = b"Hello World!";
    let word = alloc(message.len() as u32).unwrap();
    unsafe {
        ptr::copy_nonoverlapping(message.as_ptr(), word, message.len());
    }
    println!("Word address: {:p}", word);

    let text = unsafe { std::slice::from_raw_parts(word, message.len()) };
    println!("Word value: {}", String::from_utf8_lossy(text));

    let grown = realloc(word, 4 * message.len() as u32).unwrap();
    println!("Grown address: {:p}", grown);

    let text = unsafe { std::slice::from_raw_parts(grown, message.len()) };
    println!("Grown value: {}", String::from_utf8_lossy(text));

    free(grown);
    println!("Heap violations after free: {}", check(true));
}
