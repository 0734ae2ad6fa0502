use serde_json::json;

use crate::fragment::{FragmentCode, FragmentDescriptor, RawFragmentFile};

/// Canned fragment for a prompt, used when no generator is available.
///
/// Keywords are matched case-insensitively in order: `next`, `streamlit`,
/// `gradio`, `vue`. Anything else yields a Python snippet.
pub fn generate_offline_fragment(prompt: &str) -> FragmentDescriptor {
    let prompt = prompt.to_lowercase();

    if prompt.contains("next") {
        next_app()
    } else if prompt.contains("streamlit") {
        single_file(SingleFile {
            commentary: "Generated a Streamlit demo (offline preset).",
            template: "streamlit-developer",
            title: "Streamlit App",
            description: "Simple Streamlit app.",
            dependencies: &["streamlit"],
            has_additional_dependencies: true,
            install: "pip install streamlit",
            port: Some(8501),
            file_path: "app.py",
            code: "import streamlit as st\nst.title(\"Offline Streamlit Demo\")\nst.write(\"Hello!\")",
        })
    } else if prompt.contains("gradio") {
        single_file(SingleFile {
            commentary: "Generated a Gradio demo (offline preset).",
            template: "gradio-developer",
            title: "Gradio App",
            description: "Simple Gradio interface.",
            dependencies: &["gradio"],
            has_additional_dependencies: true,
            install: "pip install gradio",
            port: Some(7860),
            file_path: "app.py",
            code: "import gradio as gr\n\niface = gr.Interface(fn=lambda x: x, inputs=\"text\", outputs=\"text\", title=\"Offline Gradio\")\niface.launch()",
        })
    } else if prompt.contains("vue") {
        single_file(SingleFile {
            commentary: "Generated a minimal Vue starter (offline preset).",
            template: "vue-developer",
            title: "Vue App",
            description: "Minimal Vue 3 starter.",
            dependencies: &["vue"],
            has_additional_dependencies: false,
            install: "npm install",
            port: Some(3000),
            file_path: "app.vue",
            code: "<template><main><h1>Offline Vue Starter</h1></main></template>",
        })
    } else {
        single_file(SingleFile {
            commentary: "Generated a Python demo (offline preset).",
            template: "code-interpreter-v1",
            title: "Python Demo",
            description: "Simple Python snippet.",
            dependencies: &[],
            has_additional_dependencies: false,
            install: "pip install --no-deps",
            port: None,
            file_path: "script.py",
            code: "print(\"Hello from offline mode\")",
        })
    }
}

struct SingleFile {
    commentary: &'static str,
    template: &'static str,
    title: &'static str,
    description: &'static str,
    dependencies: &'static [&'static str],
    has_additional_dependencies: bool,
    install: &'static str,
    port: Option<u16>,
    file_path: &'static str,
    code: &'static str,
}

fn single_file(preset: SingleFile) -> FragmentDescriptor {
    FragmentDescriptor {
        commentary: Some(preset.commentary.to_string()),
        template: Some(preset.template.to_string()),
        title: Some(preset.title.to_string()),
        description: Some(preset.description.to_string()),
        additional_dependencies: Some(
            preset
                .dependencies
                .iter()
                .map(|dep| Some(dep.to_string()))
                .collect(),
        ),
        has_additional_dependencies: Some(preset.has_additional_dependencies),
        install_dependencies_command: Some(preset.install.to_string()),
        port: preset.port,
        file_path: Some(preset.file_path.to_string()),
        code: Some(FragmentCode::Source(preset.code.to_string())),
    }
}

fn file(path: &str, content: impl Into<String>) -> Option<RawFragmentFile> {
    Some(RawFragmentFile {
        file_name: path.rsplit('/').next().map(str::to_string),
        file_path: Some(path.to_string()),
        file_content: Some(content.into()),
        file_finished: Some(true),
    })
}

fn next_app() -> FragmentDescriptor {
    let package_json = json!({
        "name": "offline-next-app",
        "private": true,
        "scripts": {
            "dev": "next dev",
            "build": "next build",
            "start": "next start"
        },
        "dependencies": {
            "next": "14.2.3",
            "react": "18.2.0",
            "react-dom": "18.2.0"
        }
    });

    FragmentDescriptor {
        commentary: Some(
            "Generated a minimal Next.js app (offline preset). Use Run in browser to start it."
                .to_string(),
        ),
        template: Some("nextjs-developer".to_string()),
        title: Some("Next.js App".to_string()),
        description: Some("Minimal Next.js starter with an API route.".to_string()),
        additional_dependencies: Some(vec![
            Some("next".to_string()),
            Some("react".to_string()),
            Some("react-dom".to_string()),
        ]),
        has_additional_dependencies: Some(false),
        install_dependencies_command: Some("npm install".to_string()),
        port: Some(3000),
        file_path: Some("package.json".to_string()),
        code: Some(FragmentCode::Files(vec![
            file("package.json", format!("{:#}", package_json)),
            file("next.config.mjs", "export default { }"),
            file(
                "pages/_app.tsx",
                "import type { AppProps } from 'next/app'\nimport '@/styles/globals.css'\nexport default function App({ Component, pageProps }: AppProps){ return <Component {...pageProps} /> }",
            ),
            file(
                "pages/index.tsx",
                "export default function Home(){ return <main style={{padding:20}}><h1>Offline Next.js Starter</h1><p>API: <a href=\"/api/hello\">/api/hello</a></p></main> }",
            ),
            file(
                "pages/api/hello.ts",
                "import type { NextApiRequest, NextApiResponse } from 'next'\nexport default function handler(_req: NextApiRequest, res: NextApiResponse){ res.status(200).json({ ok: true, message: 'Hello from offline API' }) }",
            ),
            file("styles/globals.css", "body{font-family: system-ui, sans-serif}"),
        ])),
    }
}
