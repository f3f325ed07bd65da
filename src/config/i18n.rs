//! Localized operator-facing strings.

/// Console labels for one language.
#[derive(Debug, Clone)]
pub struct Messages {
    pub thinking: &'static str,
    pub action: &'static str,
    pub task_completed: &'static str,
    /// Final message when a finish carries none.
    pub done: &'static str,
    pub performance_metrics: &'static str,
    pub time_to_first_token: &'static str,
    pub time_to_thinking_end: &'static str,
    pub total_inference_time: &'static str,
}

pub static MESSAGES_ZH: Messages = Messages {
    thinking: "思考过程",
    action: "执行动作",
    task_completed: "任务完成",
    done: "完成",
    performance_metrics: "性能指标",
    time_to_first_token: "首 Token 延迟 (TTFT)",
    time_to_thinking_end: "思考完成延迟",
    total_inference_time: "总推理时间",
};

pub static MESSAGES_EN: Messages = Messages {
    thinking: "Thinking",
    action: "Action",
    task_completed: "Task Completed",
    done: "Done",
    performance_metrics: "Performance Metrics",
    time_to_first_token: "Time to First Token (TTFT)",
    time_to_thinking_end: "Time to Thinking End",
    total_inference_time: "Total Inference Time",
};

/// Labels for `lang`; anything other than "en" gets Chinese.
pub fn get_messages(lang: &str) -> &'static Messages {
    match lang {
        "en" => &MESSAGES_EN,
        _ => &MESSAGES_ZH,
    }
}
