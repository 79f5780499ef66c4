//! Minimal stand-ins for the C standard headers.
//!
//! Preprocessing against these instead of the system headers keeps the
//! checker's input small and identical across machines. They declare types and
//! constants only; calls to undeclared functions parse fine.

use std::fs;
use std::io;
use std::path::Path;

const FAKE_DEFINES: &str = "\
#ifndef _FAKE_DEFINES_H
#define _FAKE_DEFINES_H
#define NULL 0
#define EOF (-1)
#define true 1
#define false 0
#define EXIT_SUCCESS 0
#define EXIT_FAILURE 1
#define RAND_MAX 32767
#define INT_MAX 2147483647
#define INT_MIN (-2147483647 - 1)
#define UINT_MAX 4294967295U
#define LONG_MAX 9223372036854775807L
#define LONG_MIN (-9223372036854775807L - 1)
#define CHAR_BIT 8
#define CHAR_MAX 127
#define CHAR_MIN (-128)
#define SEEK_SET 0
#define SEEK_CUR 1
#define SEEK_END 2
#define BUFSIZ 8192
#define CLOCKS_PER_SEC 1000000
#define M_PI 3.14159265358979323846
#define assert(x) ((void)0)
#define offsetof(type, member) ((size_t)0)
#define va_start(ap, last) ((void)0)
#define va_arg(ap, type) (*(type *)0)
#define va_end(ap) ((void)0)
#endif
";

const FAKE_TYPEDEFS: &str = "\
#ifndef _FAKE_TYPEDEFS_H
#define _FAKE_TYPEDEFS_H
typedef int size_t;
typedef int ssize_t;
typedef int ptrdiff_t;
typedef int wchar_t;
typedef int FILE;
typedef int fpos_t;
typedef int va_list;
typedef int time_t;
typedef int clock_t;
typedef int pid_t;
typedef int off_t;
typedef int intptr_t;
typedef int uintptr_t;
typedef int int8_t;
typedef int int16_t;
typedef int int32_t;
typedef int int64_t;
typedef int uint8_t;
typedef int uint16_t;
typedef int uint32_t;
typedef int uint64_t;
typedef int bool;
typedef int div_t;
typedef int ldiv_t;
struct tm { int tm_sec; int tm_min; int tm_hour; int tm_mday; int tm_mon; int tm_year; };
extern FILE *stdin;
extern FILE *stdout;
extern FILE *stderr;
#endif
";

/// Standard headers that resolve to the shared fake definitions.
const STANDARD_HEADERS: &[&str] = &[
    "assert.h", "ctype.h", "errno.h", "float.h", "limits.h", "math.h", "stdarg.h", "stdbool.h",
    "stddef.h", "stdint.h", "stdio.h", "stdlib.h", "string.h", "time.h", "unistd.h",
];

/// Write the fake header set into `dir` (created if needed).
pub fn write_stub_headers(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("_fake_defines.h"), FAKE_DEFINES)?;
    fs::write(dir.join("_fake_typedefs.h"), FAKE_TYPEDEFS)?;
    for header in STANDARD_HEADERS {
        fs::write(
            dir.join(header),
            "#include \"_fake_defines.h\"\n#include \"_fake_typedefs.h\"\n",
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_every_standard_header() {
        let dir = tempfile::tempdir().unwrap();
        write_stub_headers(dir.path()).unwrap();
        for header in STANDARD_HEADERS {
            assert!(dir.path().join(header).is_file(), "{header} missing");
        }
        let stdio = fs::read_to_string(dir.path().join("stdio.h")).unwrap();
        assert!(stdio.contains("_fake_typedefs.h"));
    }
}
