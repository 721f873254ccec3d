/// Define a closed string-tagged enum.
///
/// Each variant maps to exactly one wire/database string. The generated
/// type serializes as that string, parses from it via `FromStr`, and
/// exposes `ALL` for membership checks and help text.
macro_rules! define_tag_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $val)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The canonical string form.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $val ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::tags::UnknownTag;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $val => Ok($name::$variant), )+
                    _ => Err($crate::tags::UnknownTag {
                        kind: $label,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}
