//! `java.io` streams exposed as `std::io` readers and writers.
//!
//! Each call attaches to the VM for its duration. The thread is usually
//! already attached by the Kotlin caller, so every chunk runs in its own
//! local frame and its byte array is released before the next one. The Java
//! stream is closed when the wrapper is dropped.

use std::io::{self, Read, Write};

use jni::objects::{GlobalRef, JValue};

use super::with_env;

const CHUNK_SIZE: usize = 64 * 1024;
/// Local refs created per chunk: the byte array
const CHUNK_FRAME: i32 = 4;

fn close(stream: &GlobalRef) {
    let closed = with_env(|env| {
        env.call_method(stream.as_obj(), "close", "()V", &[])?;
        Ok(())
    });
    if let Err(e) = closed {
        log::warn!("Failed to close Java stream: {e}");
    }
}

pub(crate) struct JavaInputStream {
    stream: GlobalRef,
}

impl JavaInputStream {
    pub(crate) fn new(stream: GlobalRef) -> Self {
        Self { stream }
    }
}

impl Read for JavaInputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(CHUNK_SIZE) as i32;
        let chunk = with_env(|env| {
            env.with_local_frame(CHUNK_FRAME, |env| {
                let array = env.new_byte_array(len)?;
                let read = env
                    .call_method(
                        self.stream.as_obj(),
                        "read",
                        "([BII)I",
                        &[JValue::Object(&array), JValue::Int(0), JValue::Int(len)],
                    )?
                    .i()?;
                // -1 is end of stream
                if read <= 0 {
                    return Ok(Vec::new());
                }
                let mut bytes = vec![0i8; read as usize];
                env.get_byte_array_region(&array, 0, &mut bytes)?;
                Ok(bytes)
            })
        })
        .map_err(io::Error::other)?;

        for (dst, src) in buf.iter_mut().zip(&chunk) {
            *dst = *src as u8;
        }
        Ok(chunk.len())
    }
}

impl Drop for JavaInputStream {
    fn drop(&mut self) {
        close(&self.stream);
    }
}

pub(crate) struct JavaOutputStream {
    stream: GlobalRef,
}

impl JavaOutputStream {
    pub(crate) fn new(stream: GlobalRef) -> Self {
        Self { stream }
    }
}

impl Write for JavaOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len().min(CHUNK_SIZE);
        with_env(|env| {
            env.with_local_frame(CHUNK_FRAME, |env| {
                let array = env.byte_array_from_slice(&buf[..len])?;
                env.call_method(
                    self.stream.as_obj(),
                    "write",
                    "([BII)V",
                    &[JValue::Object(&array), JValue::Int(0), JValue::Int(len as i32)],
                )?;
                Ok(len)
            })
        })
        .map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        with_env(|env| {
            env.call_method(self.stream.as_obj(), "flush", "()V", &[])?;
            Ok(())
        })
        .map_err(io::Error::other)
    }
}

impl Drop for JavaOutputStream {
    fn drop(&mut self) {
        close(&self.stream);
    }
}
