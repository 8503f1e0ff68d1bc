use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Ident, LitInt, Token,
    parse::{Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
};

struct KeyValue {
    key: Ident,
    _eq: Token![=],
    value: u8,
}

struct MacroArgs {
    key: u8,
    asc: u8,
    ascq: u8,
}

impl Parse for KeyValue {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        Ok(Self {
            key: input.parse()?,
            _eq: input.parse()?,
            value: input.parse::<LitInt>()?.base10_parse()?,
        })
    }
}

impl Parse for MacroArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let parsed_kvs: Punctuated<KeyValue, Token![,]> = Punctuated::parse_terminated(input)?;

        let mut key: Option<u8> = None;
        let mut asc: Option<u8> = None;
        let mut ascq: Option<u8> = None;

        for kv in parsed_kvs {
            if kv.key == "key" {
                if key.is_some() {
                    panic!("`key` encountered more than once");
                }
                key = Some(kv.value);
            } else if kv.key == "asc" {
                if asc.is_some() {
                    panic!("`asc` encountered more than once");
                }
                asc = Some(kv.value);
            } else if kv.key == "ascq" {
                if ascq.is_some() {
                    panic!("`ascq` encountered more than once");
                }
                ascq = Some(kv.value);
            }
        }

        let key = key.ok_or_else(|| input.error("missing required key `key`"))?;
        let asc = asc.ok_or_else(|| input.error("missing required key `asc`"))?;
        let ascq = ascq.ok_or_else(|| input.error("missing required key `ascq`"))?;

        Ok(Self { key, asc, ascq })
    }
}

/// Derives `sense()` on an error enum whose variants each carry a
/// `#[sense(key = …, asc = …, ascq = …)]` attribute, yielding the fixed-format
/// sense triple a CHECK CONDITION response reports for that error.
#[proc_macro_derive(SenseData, attributes(sense))]
pub fn derive_sense_data_enum(input: TokenStream) -> TokenStream {
    let DeriveInput { ident, data, .. } = parse_macro_input!(input);

    let Data::Enum(data_enum) = data else {
        panic!("SenseData can only be derived for enums");
    };

    let mut sense_arms = Vec::new();

    for variant in data_enum.variants {
        let ident = variant.ident;

        let attr = variant
            .attrs
            .iter()
            .find(|a| a.path().is_ident("sense"))
            .expect("missing #[sense(...)] attribute");

        let args: MacroArgs = attr.parse_args().expect("Invalid sense args");

        let key = args.key;
        let asc = args.asc;
        let ascq = args.ascq;

        sense_arms.push(quote! {
            Self::#ident { .. } => (#key, #asc, #ascq)
        });
    }

    let expanded = quote! {
        impl #ident {
            /// (sense key, ASC, ASCQ) for this error.
            pub fn sense(&self) -> (u8, u8, u8) {
                match self {
                    #(#sense_arms,)*
                }
            }

            pub fn sense_key(&self) -> u8 {
                self.sense().0
            }

            pub fn asc(&self) -> u8 {
                self.sense().1
            }

            pub fn ascq(&self) -> u8 {
                self.sense().2
            }
        }
    };

    expanded.into()
}
