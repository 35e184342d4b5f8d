use proc_macro::TokenStream;
use quote::{format_ident, quote, ToTokens};
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, ItemStruct, Meta, Token};

/// Byte order of multi-byte fields.
#[derive(Clone, Copy, PartialEq)]
enum Endian {
    Little,
    Big,
}

struct FrameArgs {
    endian: Endian,
    constructor: bool,
    error: proc_macro2::TokenStream,
}

fn parse_args(attr: TokenStream) -> FrameArgs {
    let mut args = FrameArgs {
        endian: Endian::Little,
        constructor: true,
        error: quote! { Error },
    };

    if attr.is_empty() {
        return args;
    }

    let parser = Punctuated::<Meta, Token![,]>::parse_terminated;
    let metas = syn::parse::Parser::parse(parser, attr).expect("invalid #[frame] arguments");

    for meta in metas {
        match meta {
            Meta::Path(path) if path.is_ident("be") => args.endian = Endian::Big,
            Meta::Path(path) if path.is_ident("le") => args.endian = Endian::Little,
            Meta::Path(path) if path.is_ident("no_constructor") => args.constructor = false,
            Meta::NameValue(nv) if nv.path.is_ident("error") => {
                args.error = nv.value.to_token_stream();
            }
            other => panic!("unknown #[frame] argument: {}", other.to_token_stream()),
        }
    }

    args
}

fn int_attr(attrs: &[syn::Attribute], name: &str) -> Option<usize> {
    attrs.iter().find(|attr| attr.path().is_ident(name)).map(|attr| {
        attr.parse_args::<syn::LitInt>()
            .unwrap()
            .base10_parse::<usize>()
            .unwrap()
    })
}

/// Generate a zero-copy reader/writer for a fixed layout structure.
///
/// Every field becomes a getter (and a `set_` setter for integer fields) at
/// the offset implied by the fields before it. Supported field attributes:
/// `#[bytes(n)]`, `#[bits(n)]`, `#[condition(expr)]` and `#[into(Type)]`.
/// Multi-byte integers are little-endian unless the struct is annotated with
/// `#[frame(be)]`.
#[proc_macro_attribute]
pub fn frame(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_args(attr);
    let input = parse_macro_input!(item as ItemStruct);

    let item_attr = input.attrs;
    let vis = input.vis;
    let name = input.ident;
    let error = &args.error;

    let mut f = quote! {
        #(#item_attr)*
        #vis struct #name<T: AsRef<[u8]>> {
            buffer: T,
        }
    };

    let mut impls = vec![];
    let mut setters = vec![];

    impls.push(quote! {
        /// Create a new reader/writer without checking the buffer length.
        pub fn new_unchecked(buffer: T) -> Self {
            Self { buffer }
        }

        /// Return the underlying buffer.
        pub fn into_inner(self) -> T {
            self.buffer
        }
    });

    let mut offset = 0;
    let mut bits_offset = 0;

    for field in input.fields {
        let fnname = field.ident.unwrap();
        let ty = field.ty;
        let ty_str = ty.to_token_stream().to_string();

        let doc = field.attrs.iter().find(|attr| attr.path().is_ident("doc"));

        let condition = field
            .attrs
            .iter()
            .find(|attr| attr.path().is_ident("condition"))
            .map(|attr| attr.parse_args::<syn::Expr>().unwrap());

        let into = field
            .attrs
            .iter()
            .find(|attr| attr.path().is_ident("into"))
            .map(|attr| attr.parse_args::<syn::Type>().unwrap());

        let bytes = int_attr(&field.attrs, "bytes").or(match ty_str.as_str() {
            "u8" => Some(1),
            "u16" | "i16" => Some(2),
            "u32" | "i32" => Some(4),
            "u64" => Some(8),
            _ => None,
        });

        let bits = int_attr(&field.attrs, "bits");

        let from_bytes = |int: proc_macro2::TokenStream, n: usize| {
            let idx = (0..n).map(syn::Index::from);
            match args.endian {
                Endian::Little => quote! { #int::from_le_bytes([#(buffer[#idx]),*]) },
                Endian::Big => quote! { #int::from_be_bytes([#(buffer[#idx]),*]) },
            }
        };

        if !fnname.to_string().contains("reserved") {
            let getter = match ty_str.as_str() {
                "bool" => quote! {
                    let buffer = &self.buffer.as_ref()[#offset..];
                    ((buffer[0] >> #bits_offset) & 0b1) != 0
                },
                "u8" => {
                    if let Some(bits) = bits {
                        quote! {
                            let buffer = &self.buffer.as_ref()[#offset..];
                            (buffer[0] >> #bits_offset) & ((1u16 << #bits) - 1) as u8
                        }
                    } else {
                        quote! {
                            self.buffer.as_ref()[#offset..][0]
                        }
                    }
                }
                "u16" => {
                    let read = from_bytes(quote!(u16), 2);
                    quote! {
                        let buffer = &self.buffer.as_ref()[#offset..];
                        #read
                    }
                }
                "i16" => {
                    let read = from_bytes(quote!(i16), 2);
                    quote! {
                        let buffer = &self.buffer.as_ref()[#offset..];
                        #read
                    }
                }
                "u32" if bytes == Some(3) => match args.endian {
                    Endian::Little => quote! {
                        let buffer = &self.buffer.as_ref()[#offset..];
                        u32::from_le_bytes([buffer[0], buffer[1], buffer[2], 0])
                    },
                    Endian::Big => quote! {
                        let buffer = &self.buffer.as_ref()[#offset..];
                        u32::from_be_bytes([0, buffer[0], buffer[1], buffer[2]])
                    },
                },
                "u32" => {
                    let read = from_bytes(quote!(u32), 4);
                    quote! {
                        let buffer = &self.buffer.as_ref()[#offset..];
                        #read
                    }
                }
                "i32" => {
                    let read = from_bytes(quote!(i32), 4);
                    quote! {
                        let buffer = &self.buffer.as_ref()[#offset..];
                        #read
                    }
                }
                "u64" => {
                    let read = from_bytes(quote!(u64), 8);
                    quote! {
                        let buffer = &self.buffer.as_ref()[#offset..];
                        #read
                    }
                }
                "& [u8]" => {
                    if bytes == Some(0) || bytes.is_none() {
                        quote! {
                            &self.buffer.as_ref()[#offset..]
                        }
                    } else {
                        quote! {
                            &self.buffer.as_ref()[#offset..][..#bytes]
                        }
                    }
                }
                _ => {
                    quote! {
                        #ty::new_unchecked(&self.buffer.as_ref()[#offset..][..#ty::<&[u8]>::size()])
                    }
                }
            };

            let (getter, return_type) = match into {
                Some(ref into) => (quote! { #into::from({ #getter }) }, quote! { #into }),
                None => (
                    getter,
                    match ty_str.as_str() {
                        "bool" | "u8" | "u16" | "i16" | "u32" | "i32" | "u64" | "& [u8]" => {
                            quote! { #ty }
                        }
                        _ => quote! { #ty<&[u8]> },
                    },
                ),
            };

            if let Some(ref condition) = condition {
                impls.push(quote! {
                    #doc
                    pub fn #fnname(&self) -> Option<#return_type> {
                        if #condition {
                            Some({ #getter })
                        } else {
                            None
                        }
                    }
                });
            } else {
                impls.push(quote! {
                    #doc
                    pub fn #fnname(&self) -> #return_type {
                        #getter
                    }
                });
            }

            let setter_name = format_ident!("set_{}", fnname);
            let write_int = |n: usize| {
                let range = quote! { [#offset..][..#n] };
                match args.endian {
                    Endian::Little => quote! {
                        self.buffer.as_mut()#range.copy_from_slice(&value.to_le_bytes());
                    },
                    Endian::Big => quote! {
                        self.buffer.as_mut()#range.copy_from_slice(&value.to_be_bytes());
                    },
                }
            };

            let setter = match ty_str.as_str() {
                "bool" => Some(quote! {
                    let b = &mut self.buffer.as_mut()[#offset];
                    *b = (*b & !(1 << #bits_offset)) | ((value as u8) << #bits_offset);
                }),
                "u8" => Some(if let Some(bits) = bits {
                    quote! {
                        let mask = (((1u16 << #bits) - 1) as u8) << #bits_offset;
                        let b = &mut self.buffer.as_mut()[#offset];
                        *b = (*b & !mask) | ((value << #bits_offset) & mask);
                    }
                } else {
                    quote! {
                        self.buffer.as_mut()[#offset] = value;
                    }
                }),
                "u16" | "i16" => Some(write_int(2)),
                "u32" | "i32" if bytes != Some(3) => Some(write_int(4)),
                "u64" => Some(write_int(8)),
                _ => None,
            };

            if let (Some(setter), None) = (setter, &into) {
                setters.push(quote! {
                    /// Set the field value.
                    pub fn #setter_name(&mut self, value: #ty) {
                        #setter
                    }
                });
            }
        }

        if let Some(n) = int_attr(&field.attrs, "bytes") {
            offset += n;
        } else if let Some(bits) = bits {
            bits_offset += bits;

            if bits_offset % 8 == 0 && bits_offset != 0 {
                offset += bits_offset / 8;
                bits_offset = 0;
            }
        } else if let Some(n) = bytes {
            offset += n;
        }
    }

    let constructor = if args.constructor {
        quote! {
            /// Create a new reader/writer, checking that the buffer holds the
            /// full structure.
            pub fn new(buffer: T) -> Result<Self> {
                if buffer.as_ref().len() < Self::size() {
                    return Err(#error);
                }

                Ok(Self { buffer })
            }
        }
    } else {
        quote! {}
    };

    f.extend(quote! {
        impl<T: AsRef<[u8]>> #name<T> {
            #constructor

            #(#impls)*

            /// Returns the size of this structure in bytes.
            pub const fn size() -> usize {
                #offset
            }
        }

        impl<T: AsRef<[u8]> + AsMut<[u8]>> #name<T> {
            #(#setters)*
        }
    });

    f.into()
}
