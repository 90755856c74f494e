// Copyright 2025, The Embedtor Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

/// Assert that a value is a particular enum variant, binding the variant's
/// fields into the enclosing scope. Panics with the expected variant name when
/// the value is anything else.
///
/// Three shapes are supported: a bare unit variant, a tuple variant with its
/// fields listed positionally, and a struct variant with its fields named.
///
/// ```edition2021
/// # use embedtor_test_utils::unpack_enum;
///
/// #[derive(Debug)]
/// enum Reply {
///     Done,
///     Code(u16),
///     Line { code: u16, text: &'static str },
/// }
///
/// unpack_enum!(Reply::Done = Reply::Done);
///
/// unpack_enum!(Reply::Code(code) = Reply::Code(250));
/// assert_eq!(code, 250);
///
/// unpack_enum!(Reply::Line { code, text } = Reply::Line { code: 514, text: "auth required" });
/// assert_eq!(code, 514);
/// assert_eq!(text, "auth required");
/// ```
#[macro_export]
macro_rules! unpack_enum {
    ($($variant:ident)::+ ( $($field:ident),+ $(,)? ) = $value:expr) => {
        $crate::unpack_enum!(@bind $($variant)::+, ( $($field),+ ), $value);
    };
    ($($variant:ident)::+ { $($field:ident),+ $(,)? } = $value:expr) => {
        $crate::unpack_enum!(@bind $($variant)::+, { $($field),+ }, $value);
    };
    ($($variant:ident)::+ = $value:expr) => {
        match $value {
            $($variant)::+ => (),
            other => panic!("expected {}, got {:?}", stringify!($($variant)::+), other),
        }
    };
    // Shared binding arm: the pattern fragment is spliced in whole, so tuple
    // and struct variants destructure the same way
    (@bind $($variant:ident)::+, $fields:tt, $value:expr) => {
        let $($variant)::+ $fields = ($value) else {
            panic!("expected {}", stringify!($($variant)::+));
        };
    };
}
